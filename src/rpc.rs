use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind},
    request::RpcError,
};
use solana_signature::Signature;
use solana_transaction::Transaction;
use solana_transaction_status_client_types::{
    EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding, UiTransactionTokenBalance,
};
use spl_associated_token_account::get_associated_token_address;
use tracing::debug;

use crate::{
    errors::{Error, Result},
    ledger::{ConfirmedTransfer, LedgerGateway, TxStatus},
    networks::Network,
    token::TokenId,
};

/// Ledger gateway over a Solana JSON-RPC node.
///
/// Confirmed-transfer facts are read back from the transaction's meta
/// (token-balance deltas for SPL transfers, lamport deltas for native ones),
/// so the engine can re-check a confirmation against the recorded intent.
pub struct RpcLedgerGateway {
    network: Network,
    client: RpcClient,
}

impl RpcLedgerGateway {
    pub fn new(network: Network) -> Self {
        Self::with_url(network, network.default_rpc_url())
    }

    pub fn with_url(network: Network, url: impl Into<String>) -> Self {
        Self {
            network,
            client: RpcClient::new_with_commitment(url.into(), CommitmentConfig::confirmed()),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn classify(err: ClientError) -> Error {
        match err.kind() {
            ErrorKind::RpcError(RpcError::RpcResponseError { message, .. }) => {
                Error::LedgerRejected(message.clone())
            }
            ErrorKind::TransactionError(tx_err) => Error::LedgerRejected(tx_err.to_string()),
            _ => Error::LedgerUnavailable(err.to_string()),
        }
    }
}

/// Extract the transfer the ledger actually executed. SPL transfers show up
/// as a token-balance increase; native transfers as the largest lamport gain
/// (the fee payer only ever loses lamports in the sponsored skeletons this
/// facilitator issues).
fn extract_transfer(
    confirmed: &EncodedConfirmedTransactionWithStatusMeta,
) -> Option<ConfirmedTransfer> {
    let meta = confirmed.transaction.meta.as_ref()?;

    let pre_token: Option<Vec<UiTransactionTokenBalance>> = meta.pre_token_balances.clone().into();
    let post_token: Option<Vec<UiTransactionTokenBalance>> =
        meta.post_token_balances.clone().into();
    if let Some(post_token) = post_token {
        let pre_token = pre_token.unwrap_or_default();
        for balance in &post_token {
            let before = pre_token
                .iter()
                .find(|b| b.account_index == balance.account_index)
                .and_then(|b| b.ui_token_amount.amount.parse::<u64>().ok())
                .unwrap_or(0);
            let after = balance.ui_token_amount.amount.parse::<u64>().unwrap_or(0);
            if after > before {
                let owner: Option<String> = balance.owner.clone().into();
                let Some(owner) = owner else { continue };
                let (Ok(recipient), Ok(mint)) =
                    (owner.parse::<Pubkey>(), balance.mint.parse::<Pubkey>())
                else {
                    continue;
                };
                return Some(ConfirmedTransfer {
                    recipient,
                    mint: Some(mint),
                    amount: after - before,
                });
            }
        }
    }

    let decoded = confirmed.transaction.transaction.decode()?;
    let keys = decoded.message.static_account_keys();
    let mut best: Option<(usize, u64)> = None;
    for (index, (pre, post)) in meta
        .pre_balances
        .iter()
        .zip(meta.post_balances.iter())
        .enumerate()
    {
        if post > pre {
            let delta = post - pre;
            if best.is_none_or(|(_, largest)| delta > largest) {
                best = Some((index, delta));
            }
        }
    }
    let (index, amount) = best?;
    Some(ConfirmedTransfer {
        recipient: *keys.get(index)?,
        mint: None,
        amount,
    })
}

impl LedgerGateway for RpcLedgerGateway {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(Self::classify)
    }

    async fn submit(&self, tx: &Transaction) -> Result<Signature> {
        self.client.send_transaction(tx).await.map_err(Self::classify)
    }

    async fn status(&self, handle: &Signature) -> Result<TxStatus> {
        match self
            .client
            .get_signature_status(handle)
            .await
            .map_err(Self::classify)?
        {
            None => Ok(TxStatus::Pending),
            Some(Err(tx_err)) => Ok(TxStatus::Failed(tx_err.to_string())),
            Some(Ok(())) => {
                // The status cache can lead the transaction store; a miss
                // here is still-pending, not a rejection.
                let confirmed = self
                    .client
                    .get_transaction(handle, UiTransactionEncoding::Base64)
                    .await
                    .map_err(|err| Error::LedgerUnavailable(err.to_string()))?;
                debug!(%handle, slot = confirmed.slot, "transaction landed");
                match extract_transfer(&confirmed) {
                    Some(transfer) => Ok(TxStatus::Confirmed(transfer)),
                    // No recognizable transfer in the meta: report zero facts
                    // so the caller's re-check fails rather than accepting.
                    None => Ok(TxStatus::Confirmed(ConfirmedTransfer {
                        recipient: Pubkey::default(),
                        mint: None,
                        amount: 0,
                    })),
                }
            }
        }
    }

    async fn balance(&self, account: &Pubkey, token: &TokenId) -> Result<u64> {
        match token.mint(self.network) {
            None => self.client.get_balance(account).await.map_err(Self::classify),
            Some(mint) => {
                let ata = get_associated_token_address(account, &mint);
                match self.client.get_token_account_balance(&ata).await {
                    Ok(balance) => balance
                        .amount
                        .parse::<u64>()
                        .map_err(|err| Error::LedgerUnavailable(err.to_string())),
                    Err(err) => match err.kind() {
                        // No associated token account yet: holdings are zero,
                        // not an outage.
                        ErrorKind::RpcError(RpcError::ForUser(_)) => Ok(0),
                        _ => Err(Self::classify(err)),
                    },
                }
            }
        }
    }
}
