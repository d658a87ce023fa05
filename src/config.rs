use std::time::Duration;

use bon::Builder;

use crate::{networks::Network, token::TokenId};

/// Poll pacing for confirmation tracking: the interval starts at `base`,
/// doubles after every poll, and is capped at `ceiling`. Sleeps are always
/// clipped to the payment deadline.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(8),
        }
    }
}

/// Facilitator-wide configuration.
#[derive(Builder, Debug, Clone)]
pub struct FacilitatorConfig {
    /// Networks payments may settle on. Must each have a configured ledger
    /// gateway.
    pub networks: Vec<Network>,
    /// Assets accepted for payment.
    pub tokens: Vec<TokenId>,
    /// Seconds until an unsettled payment expires.
    #[builder(default = 300)]
    pub expiry_secs: i64,
    /// Creation is refused while the sponsor's native balance is below this,
    /// in lamports.
    #[builder(default = 100_000)]
    pub min_sponsor_balance: u64,
    #[builder(default)]
    pub backoff: PollBackoff,
}

/// Access tier granted by on-ledger holdings. Tiers are listed in ascending
/// order; the gate resolves a wallet to the last tier it satisfies.
#[derive(Builder, Debug, Clone)]
pub struct MembershipTier {
    #[builder(into)]
    pub name: String,
    pub token: TokenId,
    /// Minimum holdings in the token's smallest unit.
    pub required_amount: u64,
    #[builder(default)]
    pub benefits: Vec<String>,
}
