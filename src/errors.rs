use uuid::Uuid;

use crate::payment::PaymentStatus;

/// Error types for facilitator operations.
///
/// Validation errors surface as client errors and are never retried. Ledger
/// errors split the transient (`LedgerUnavailable`, retried with backoff up
/// to the payment deadline) from the fatal (`LedgerRejected`, which fails the
/// payment permanently since resubmitting the same signed blob would risk
/// replay).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payment amounts are denominated in the asset's smallest unit and must
    /// be positive.
    #[error("payment amount must be positive")]
    InvalidAmount,

    #[error("unsupported token: {0}")]
    UnsupportedToken(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The sponsor wallet cannot cover further network fees.
    #[error("sponsor balance {balance} lamports is below the minimum of {minimum}")]
    InsufficientSponsorFunds { balance: u64, minimum: u64 },

    #[error("payment not found: {0}")]
    PaymentNotFound(Uuid),

    /// The operation's state-machine precondition does not hold. Also covers
    /// replays: a second submit for an already-submitted payment lands here.
    #[error("operation not permitted while payment is {current}")]
    InvalidState { current: PaymentStatus },

    /// A concurrent actor won the compare-and-set for this transition.
    #[error("payment was transitioned concurrently; current status is {current}")]
    StateConflict { current: PaymentStatus },

    /// The payer-signed transaction does not structurally match the issued
    /// skeleton.
    #[error("signed transaction rejected: {0}")]
    SignatureMismatch(String),

    #[error("signer error: {0}")]
    Signer(String),

    /// Transient RPC failure; the operation may be retried until the payment
    /// deadline.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The ledger explicitly rejected the transaction.
    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    /// The ledger confirmed a transfer inconsistent with the recorded
    /// payment intent. Always surfaced for audit, never auto-corrected.
    #[error("confirmed transfer does not match the payment: {0}")]
    ConfirmedMismatch(String),

    /// The token gate could not read holdings; access is denied, not guessed.
    #[error("token gate unavailable: {0}")]
    GateUnavailable(String),

    /// Instruction assembly errors.
    #[error("instruction error: {0}")]
    Instruction(#[from] solana_program_error::ProgramError),

    /// JSON serialization/deserialization errors.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Base64 encoding/decoding errors.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decoding errors.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),

    /// Transaction wire-format decoding errors.
    #[error("transaction decode error: {0}")]
    TxDecode(#[from] bincode::error::DecodeError),

    /// Transaction wire-format encoding errors.
    #[error("transaction encode error: {0}")]
    TxEncode(#[from] bincode::error::EncodeError),
}

/// A specialized `Result` type for facilitator operations.
pub type Result<T> = std::result::Result<T, Error>;
