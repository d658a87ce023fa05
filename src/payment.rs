use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use uuid::Uuid;

use crate::{
    errors::{Error, Result},
    networks::Network,
    token::TokenId,
};

/// Lifecycle status of a payment.
///
/// Success path: `Created → AwaitingSignature → Submitted → Confirmed`.
/// `Failed` and `Expired` are terminal absorbing states; nothing leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    AwaitingSignature,
    Submitted,
    Confirmed,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Confirmed | PaymentStatus::Failed | PaymentStatus::Expired
        )
    }

    /// Whether `next` is a legal forward transition from `self`.
    pub fn can_advance(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Created, AwaitingSignature)
                | (AwaitingSignature, Submitted)
                | (Submitted, Confirmed)
                | (Created | AwaitingSignature | Submitted, Failed)
                | (Created | AwaitingSignature, Expired)
        )
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Created => "created",
            PaymentStatus::AwaitingSignature => "awaiting_signature",
            PaymentStatus::Submitted => "submitted",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Why a payment reached `Failed`. Recorded on the payment for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The ledger explicitly rejected the transaction.
    LedgerRejected(String),
    /// Broadcast failed at the transport level. The transaction may or may
    /// not have landed; the payment is never resubmitted.
    BroadcastFailed(String),
    /// The ledger confirmed a transfer inconsistent with the recorded
    /// intent. Flagged for manual audit.
    ConfirmedMismatch(String),
    /// The payment deadline passed while the submission was unresolved.
    DeadlineExceeded,
}

impl Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::LedgerRejected(reason) => write!(f, "ledger rejected: {reason}"),
            FailureCause::BroadcastFailed(reason) => write!(f, "broadcast failed: {reason}"),
            FailureCause::ConfirmedMismatch(detail) => {
                write!(f, "confirmed but mismatched: {detail}")
            }
            FailureCause::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// A payment owned by the settlement engine.
///
/// `unsigned_tx`, `cosigned_tx` and `ledger_tx` are populated progressively
/// as the lifecycle advances; each is written once. Terminal records are
/// immutable and retained for idempotent replay and audit.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub payer: Pubkey,
    pub facilitator: Pubkey,
    pub token: TokenId,
    /// Amount in the asset's smallest unit. Always positive.
    pub amount: u64,
    pub network: Network,
    pub status: PaymentStatus,
    /// Base64 transaction skeleton issued to the payer for signing.
    pub unsigned_tx: Option<String>,
    /// Base64 fully co-signed transaction as broadcast.
    pub cosigned_tx: Option<String>,
    /// Ledger handle of the one and only submission for this payment.
    pub ledger_tx: Option<Signature>,
    pub cause: Option<FailureCause>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl Payment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now >= self.expires_at
    }

    /// In-memory forward transition. The durable counterpart is the store's
    /// compare-and-set; this guards against illegal jumps before persisting.
    pub fn advance(&mut self, next: PaymentStatus) -> Result<()> {
        if !self.status.can_advance(next) {
            return Err(Error::InvalidState {
                current: self.status,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PaymentStatus::*;
    use super::*;

    const ALL: [PaymentStatus; 6] = [
        Created,
        AwaitingSignature,
        Submitted,
        Confirmed,
        Failed,
        Expired,
    ];

    #[test]
    fn test_success_path_is_ordered() {
        assert!(Created.can_advance(AwaitingSignature));
        assert!(AwaitingSignature.can_advance(Submitted));
        assert!(Submitted.can_advance(Confirmed));
    }

    #[test]
    fn test_terminal_states_absorb() {
        for terminal in [Confirmed, Failed, Expired] {
            for next in ALL {
                assert!(
                    !terminal.can_advance(next),
                    "{terminal} must not advance to {next}"
                );
            }
        }
    }

    #[test]
    fn test_no_regressions() {
        assert!(!AwaitingSignature.can_advance(Created));
        assert!(!Submitted.can_advance(AwaitingSignature));
        assert!(!Confirmed.can_advance(Submitted));
    }

    #[test]
    fn test_submitted_cannot_expire_only_fail() {
        assert!(!Submitted.can_advance(Expired));
        assert!(Submitted.can_advance(Failed));
        assert!(AwaitingSignature.can_advance(Expired));
    }

    #[test]
    fn test_advance_rejects_illegal_jump() {
        let mut payment = Payment {
            id: Uuid::new_v4(),
            payer: Pubkey::new_unique(),
            facilitator: Pubkey::new_unique(),
            token: TokenId::Sol,
            amount: 1,
            network: Network::SolanaDevnet,
            status: Created,
            unsigned_tx: None,
            cosigned_tx: None,
            ledger_tx: None,
            cause: None,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            idempotency_key: None,
        };
        assert!(payment.advance(Confirmed).is_err());
        payment.advance(AwaitingSignature).unwrap();
        assert_eq!(payment.status, AwaitingSignature);
    }
}
