//! Payment settlement engine for x402 facilitators on Solana.
//!
//! The facilitator sponsors network fees and partially signs settlement
//! transactions while the payer keeps custody through their own signature.
//! [`engine::SettlementEngine`] owns the payment lifecycle from creation
//! through co-signing, broadcast and confirmation tracking, with idempotent
//! creation and at-most-one submission per payment id. [`gate::TokenGate`] answers
//! token-gated access checks over the same ledger capability.

pub mod config;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod ledger;
pub mod networks;
pub mod payment;
pub mod signer;
pub mod store;
pub mod token;
pub mod transport;
pub mod verify;

#[cfg(feature = "rpc")]
pub mod rpc;
