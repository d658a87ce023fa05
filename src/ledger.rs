use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::Transaction;

use crate::{errors::Result, token::TokenId};

/// Transfer facts the ledger reports for a confirmed transaction, used to
/// re-check a confirmation against the recorded payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    pub recipient: Pubkey,
    /// `None` for a native SOL transfer.
    pub mint: Option<Pubkey>,
    /// Amount received, in the asset's smallest unit.
    pub amount: u64,
}

/// Ledger-reported outcome for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed(ConfirmedTransfer),
    Failed(String),
}

/// Abstract ledger submitter capability.
///
/// The engine never touches raw ledger wire format directly; everything it
/// needs from the chain goes through this trait. Implementations map
/// transport failures to [`Error::LedgerUnavailable`] and explicit node
/// rejections to [`Error::LedgerRejected`].
///
/// [`Error::LedgerUnavailable`]: crate::errors::Error::LedgerUnavailable
/// [`Error::LedgerRejected`]: crate::errors::Error::LedgerRejected
pub trait LedgerGateway {
    fn latest_blockhash(&self) -> impl Future<Output = Result<Hash>> + Send;

    /// Broadcast a fully signed transaction, returning its ledger handle.
    fn submit(&self, tx: &Transaction) -> impl Future<Output = Result<Signature>> + Send;

    fn status(&self, handle: &Signature) -> impl Future<Output = Result<TxStatus>> + Send;

    /// Current holdings of `account` in `token`'s smallest unit. A missing
    /// token account reads as zero; only transport failure is an error.
    fn balance(
        &self,
        account: &Pubkey,
        token: &TokenId,
    ) -> impl Future<Output = Result<u64>> + Send;
}
