use serde::Serialize;
use solana_pubkey::Pubkey;
use tracing::{debug, warn};

use crate::{config::MembershipTier, ledger::LedgerGateway, token::TokenId};

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    InsufficientBalance,
    /// Holdings could not be read; access is denied rather than guessed.
    GateUnavailable,
}

/// Outcome of a token-gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    /// Observed holdings; `None` when the ledger was unreachable.
    pub balance: Option<u64>,
    pub required: u64,
    pub reason: Option<GateReason>,
}

/// Evaluates whether a wallet's on-ledger holdings satisfy an access policy.
///
/// Pure reads against the ledger gateway's balance query; no state is
/// mutated. The gate fails closed: any uncertainty about holdings denies
/// access.
pub struct TokenGate<L> {
    ledger: L,
    tiers: Vec<MembershipTier>,
}

impl<L: LedgerGateway> TokenGate<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            tiers: Vec::new(),
        }
    }

    /// Gate with membership tiers, listed in ascending order of requirement.
    pub fn with_tiers(ledger: L, tiers: Vec<MembershipTier>) -> Self {
        Self { ledger, tiers }
    }

    pub fn tiers(&self) -> &[MembershipTier] {
        &self.tiers
    }

    /// Check whether `wallet` holds at least `required` of `token`.
    pub async fn check_access(
        &self,
        wallet: &Pubkey,
        token: &TokenId,
        required: u64,
    ) -> GateDecision {
        match self.ledger.balance(wallet, token).await {
            Ok(balance) => {
                let allowed = balance >= required;
                debug!(%wallet, token = %token, balance, required, allowed, "token gate check");
                GateDecision {
                    allowed,
                    balance: Some(balance),
                    required,
                    reason: (!allowed).then_some(GateReason::InsufficientBalance),
                }
            }
            Err(err) => {
                warn!(%wallet, token = %token, error = %err, "token gate unavailable, denying access");
                GateDecision {
                    allowed: false,
                    balance: None,
                    required,
                    reason: Some(GateReason::GateUnavailable),
                }
            }
        }
    }

    /// Highest membership tier `wallet` qualifies for, if any. Each tier
    /// check fails closed on its own.
    pub async fn tier_for(&self, wallet: &Pubkey) -> Option<&MembershipTier> {
        let mut qualified = None;
        for tier in &self.tiers {
            let decision = self
                .check_access(wallet, &tier.token, tier.required_amount)
                .await;
            if decision.allowed {
                qualified = Some(tier);
            }
        }
        qualified
    }
}
