use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use solana_message::Message;
use solana_pubkey::Pubkey;
use solana_transaction::Transaction;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::FacilitatorConfig,
    errors::{Error, Result},
    ledger::{ConfirmedTransfer, LedgerGateway, TxStatus},
    networks::Network,
    payment::{FailureCause, Payment, PaymentStatus},
    signer::FacilitatorSigner,
    store::PaymentStore,
    token::{self, TokenId},
    verify,
};

/// Request to open a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub payer: Pubkey,
    /// Amount in the asset's smallest unit.
    pub amount: u64,
    pub token: TokenId,
    pub network: Network,
    /// Client-supplied fingerprint for duplicate-creation detection.
    pub idempotency_key: Option<String>,
}

/// Owns every payment's lifecycle from creation through broadcast,
/// confirmation polling and terminal resolution.
///
/// The engine is the only writer of payment records. Every transition is a
/// compare-and-set against the record store; the per-payment mutex around
/// co-sign-and-submit and the single-flight poll registry sit on top of that
/// safety net, so a payment is broadcast at most once even under concurrent
/// retries, and sponsor funds are never spent twice for the same intent.
pub struct SettlementEngine<L, S> {
    config: FacilitatorConfig,
    signer: FacilitatorSigner,
    ledgers: HashMap<Network, L>,
    store: S,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    polling: DashMap<Uuid, ()>,
}

impl<L: LedgerGateway, S: PaymentStore> SettlementEngine<L, S> {
    pub fn new(
        config: FacilitatorConfig,
        signer: FacilitatorSigner,
        ledgers: HashMap<Network, L>,
        store: S,
    ) -> Self {
        Self {
            config,
            signer,
            ledgers,
            store,
            locks: DashMap::new(),
            polling: DashMap::new(),
        }
    }

    /// The sponsor account paying network fees.
    pub fn sponsor(&self) -> Pubkey {
        self.signer.pubkey()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ledger(&self, network: Network) -> Result<&L> {
        self.ledgers
            .get(&network)
            .ok_or_else(|| Error::UnsupportedNetwork(network.to_string()))
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    /// Validate the request, build the unsigned transfer skeleton and persist
    /// the payment in `awaiting_signature`.
    ///
    /// Creating again under the same idempotency key returns the existing
    /// payment unchanged as long as it is not failed or expired.
    pub async fn create_payment(&self, request: CreatePayment) -> Result<Payment> {
        if request.amount == 0 {
            return Err(Error::InvalidAmount);
        }
        if !self.config.tokens.contains(&request.token) {
            return Err(Error::UnsupportedToken(request.token.to_string()));
        }
        if !self.config.networks.contains(&request.network) {
            return Err(Error::UnsupportedNetwork(request.network.to_string()));
        }
        let ledger = self.ledger(request.network)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                if !matches!(
                    existing.status,
                    PaymentStatus::Failed | PaymentStatus::Expired
                ) {
                    debug!(payment = %existing.id, key, "idempotent replay of creation");
                    return Ok(existing);
                }
            }
        }

        // Sponsor funds are read fresh on every decision; a cached balance
        // could let concurrent creations overcommit the fee budget.
        let sponsor = self.signer.pubkey();
        let balance = ledger.balance(&sponsor, &TokenId::Sol).await?;
        if balance < self.config.min_sponsor_balance {
            warn!(balance, minimum = self.config.min_sponsor_balance, "sponsor balance too low");
            return Err(Error::InsufficientSponsorFunds {
                balance,
                minimum: self.config.min_sponsor_balance,
            });
        }

        let blockhash = ledger.latest_blockhash().await?;
        let instructions = token::transfer_instructions(
            &request.token,
            &request.payer,
            &sponsor,
            request.amount,
            request.network,
        )?;
        let message = Message::new_with_blockhash(&instructions, Some(&sponsor), &blockhash);
        let skeleton = Transaction::new_unsigned(message);

        let now = Utc::now();
        let mut payment = Payment {
            id: Uuid::new_v4(),
            payer: request.payer,
            facilitator: sponsor,
            token: request.token,
            amount: request.amount,
            network: request.network,
            status: PaymentStatus::Created,
            unsigned_tx: None,
            cosigned_tx: None,
            ledger_tx: None,
            cause: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.expiry_secs),
            idempotency_key: request.idempotency_key,
        };
        payment.unsigned_tx = Some(verify::encode_transaction(&skeleton)?);
        payment.advance(PaymentStatus::AwaitingSignature)?;
        self.store.create(payment.clone()).await?;

        info!(
            payment = %payment.id,
            payer = %payment.payer,
            amount = payment.amount,
            token = %payment.token,
            network = %payment.network,
            "payment created"
        );
        Ok(payment)
    }

    /// Verify the payer-signed blob against the issued skeleton, co-sign it
    /// and broadcast it, at most once per payment.
    ///
    /// The whole section runs under the payment's mutex: a concurrent call
    /// waits, re-reads the record and observes `submitted` (or a terminal
    /// state), failing with `InvalidState` instead of broadcasting again.
    pub async fn submit_payment(&self, id: Uuid, signed_tx: &str) -> Result<Payment> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let payment = self.store.get(&id).await?;
        let payment = self.expire_if_due(payment).await?;
        if payment.status != PaymentStatus::AwaitingSignature {
            return Err(Error::InvalidState {
                current: payment.status,
            });
        }
        let skeleton_blob = payment.unsigned_tx.as_deref().ok_or(Error::InvalidState {
            current: payment.status,
        })?;
        let skeleton = verify::decode_transaction(skeleton_blob)?;
        let mut tx = verify::decode_transaction(signed_tx)?;
        verify::matches_skeleton(&tx, &skeleton, &payment)?;

        self.signer.cosign(&mut tx)?;
        let ledger = self.ledger(payment.network)?;
        match ledger.submit(&tx).await {
            Ok(handle) => {
                let mut updated = payment;
                updated.cosigned_tx = Some(verify::encode_transaction(&tx)?);
                updated.ledger_tx = Some(handle);
                let updated = self.transition(updated, PaymentStatus::Submitted).await?;
                info!(payment = %updated.id, handle = %handle, "transaction submitted");
                Ok(updated)
            }
            Err(Error::LedgerRejected(reason)) => {
                warn!(payment = %payment.id, %reason, "ledger rejected submission");
                self.fail(payment, FailureCause::LedgerRejected(reason.clone()))
                    .await?;
                Err(Error::LedgerRejected(reason))
            }
            Err(Error::LedgerUnavailable(reason)) => {
                // The transaction may or may not have reached the ledger.
                // Resubmitting the same blob could settle twice, so the
                // payment fails here and stays failed.
                warn!(payment = %payment.id, %reason, "broadcast failed");
                self.fail(payment, FailureCause::BroadcastFailed(reason.clone()))
                    .await?;
                Err(Error::LedgerUnavailable(reason))
            }
            Err(other) => Err(other),
        }
    }

    /// Poll the ledger until the submission resolves or the deadline passes.
    ///
    /// Re-entry while a poll cycle is active is a no-op returning the current
    /// record. Each cycle re-reads the record and stops early if another
    /// path already reached a terminal state.
    pub async fn poll_confirmation(&self, id: Uuid) -> Result<Payment> {
        let payment = self.store.get(&id).await?;
        let payment = self.expire_if_due(payment).await?;
        if payment.status.is_terminal() {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Submitted {
            return Err(Error::InvalidState {
                current: payment.status,
            });
        }
        let Some(_slot) = PollSlot::acquire(&self.polling, id) else {
            debug!(payment = %id, "poll already in progress");
            return Ok(payment);
        };
        let handle = payment.ledger_tx.ok_or(Error::InvalidState {
            current: payment.status,
        })?;
        let ledger = self.ledger(payment.network)?;
        let mut delay = self.config.backoff.base;

        loop {
            let current = self.store.get(&id).await?;
            if current.status.is_terminal() {
                return Ok(current);
            }
            if current.is_expired_at(Utc::now()) {
                warn!(payment = %id, "deadline passed while awaiting confirmation");
                let failed = self.fail(current, FailureCause::DeadlineExceeded).await?;
                return Ok(failed);
            }
            match ledger.status(&handle).await {
                Ok(TxStatus::Pending) => {
                    debug!(payment = %id, "transaction still pending");
                }
                Err(Error::LedgerUnavailable(reason)) => {
                    warn!(payment = %id, %reason, "status query failed, retrying");
                }
                Ok(TxStatus::Failed(reason)) => {
                    warn!(payment = %id, %reason, "transaction failed on ledger");
                    let failed = self
                        .fail(current, FailureCause::LedgerRejected(reason))
                        .await?;
                    return Ok(failed);
                }
                Ok(TxStatus::Confirmed(transfer)) => {
                    return match check_confirmed(&current, &transfer) {
                        Ok(()) => {
                            let confirmed =
                                self.transition(current, PaymentStatus::Confirmed).await?;
                            info!(
                                payment = %id,
                                explorer = %confirmed.network.explorer_tx_url(&handle),
                                "payment confirmed"
                            );
                            Ok(confirmed)
                        }
                        Err(detail) => {
                            warn!(payment = %id, %detail, "confirmed transfer does not match");
                            let failed = self
                                .fail(current, FailureCause::ConfirmedMismatch(detail))
                                .await?;
                            Ok(failed)
                        }
                    };
                }
                Err(other) => return Err(other),
            }
            let remaining = (current.expires_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay.min(remaining)).await;
            delay = (delay * 2).min(self.config.backoff.ceiling);
        }
    }

    /// Authoritative current state, applying lazy expiry.
    pub async fn get_payment(&self, id: Uuid) -> Result<Payment> {
        let payment = self.store.get(&id).await?;
        self.expire_if_due(payment).await
    }

    /// Expire a payment whose deadline passed. `awaiting_signature` (and the
    /// transient `created`) become `expired`; `submitted` becomes `failed`
    /// since the broadcast may still land and needs audit.
    async fn expire_if_due(&self, payment: Payment) -> Result<Payment> {
        if !payment.is_expired_at(Utc::now()) {
            return Ok(payment);
        }
        let id = payment.id;
        let outcome = if payment.status == PaymentStatus::Submitted {
            self.fail(payment, FailureCause::DeadlineExceeded).await
        } else {
            self.transition(payment, PaymentStatus::Expired).await
        };
        match outcome {
            Ok(expired) => {
                info!(payment = %expired.id, status = %expired.status, "payment deadline passed");
                Ok(expired)
            }
            // Another actor got there first; their state is authoritative.
            Err(Error::StateConflict { .. }) => self.store.get(&id).await,
            Err(err) => Err(err),
        }
    }

    /// One durable forward transition via compare-and-set. Losing the CAS
    /// surfaces the winner's state instead of retrying.
    async fn transition(&self, mut payment: Payment, next: PaymentStatus) -> Result<Payment> {
        let from = payment.status;
        payment.advance(next)?;
        if self.store.compare_and_set(from, payment.clone()).await? {
            if payment.status.is_terminal() {
                self.locks.remove(&payment.id);
            }
            Ok(payment)
        } else {
            let current = self.store.get(&payment.id).await?;
            Err(Error::StateConflict {
                current: current.status,
            })
        }
    }

    async fn fail(&self, mut payment: Payment, cause: FailureCause) -> Result<Payment> {
        payment.cause = Some(cause);
        self.transition(payment, PaymentStatus::Failed).await
    }
}

/// Compare ledger-reported transfer facts with the recorded intent.
fn check_confirmed(
    payment: &Payment,
    transfer: &ConfirmedTransfer,
) -> std::result::Result<(), String> {
    if transfer.recipient != payment.facilitator {
        return Err(format!(
            "recipient {} differs from facilitator {}",
            transfer.recipient, payment.facilitator
        ));
    }
    let expected_mint = payment.token.mint(payment.network);
    if transfer.mint != expected_mint {
        return Err(format!(
            "asset mint {:?} differs from expected {:?}",
            transfer.mint, expected_mint
        ));
    }
    if transfer.amount != payment.amount {
        return Err(format!(
            "amount {} differs from expected {}",
            transfer.amount, payment.amount
        ));
    }
    Ok(())
}

/// Single-flight registration for a payment's poll cycle; the slot is
/// released on drop.
struct PollSlot<'a> {
    polling: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl<'a> PollSlot<'a> {
    fn acquire(polling: &'a DashMap<Uuid, ()>, id: Uuid) -> Option<Self> {
        match polling.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self { polling, id })
            }
        }
    }
}

impl Drop for PollSlot<'_> {
    fn drop(&mut self) {
        self.polling.remove(&self.id);
    }
}
