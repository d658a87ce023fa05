use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

use crate::{
    errors::{Error, Result},
    payment::{Payment, PaymentStatus},
};

/// Durable record store keyed by payment id.
///
/// All status transitions go through [`compare_and_set`]: the write is
/// rejected when the stored status no longer matches `expected`, so two
/// concurrent actors can never both win the same transition.
///
/// [`compare_and_set`]: PaymentStore::compare_and_set
pub trait PaymentStore {
    fn create(&self, payment: Payment) -> impl Future<Output = Result<()>> + Send;

    fn get(&self, id: &Uuid) -> impl Future<Output = Result<Payment>> + Send;

    /// Look up a payment by idempotency key. When several records share a
    /// key, implementations return one still eligible for replay (not
    /// failed/expired) in preference to one that is not.
    fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Payment>>> + Send;

    /// Write `updated` only if the stored status equals `expected`. Returns
    /// `false` when the observed status no longer matches.
    fn compare_and_set(
        &self,
        expected: PaymentStatus,
        updated: Payment,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// In-memory store for tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, Payment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PaymentStore for MemoryStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        match self.records.entry(payment.id) {
            Entry::Occupied(existing) => Err(Error::StateConflict {
                current: existing.get().status,
            }),
            Entry::Vacant(slot) => {
                slot.insert(payment);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Payment> {
        self.records
            .get(id)
            .map(|record| record.clone())
            .ok_or(Error::PaymentNotFound(*id))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Payment>> {
        let mut fallback = None;
        for record in self.records.iter() {
            if record.idempotency_key.as_deref() != Some(key) {
                continue;
            }
            if !matches!(
                record.status,
                PaymentStatus::Failed | PaymentStatus::Expired
            ) {
                return Ok(Some(record.clone()));
            }
            fallback = Some(record.clone());
        }
        Ok(fallback)
    }

    async fn compare_and_set(&self, expected: PaymentStatus, updated: Payment) -> Result<bool> {
        match self.records.get_mut(&updated.id) {
            Some(mut record) => {
                if record.status != expected {
                    return Ok(false);
                }
                *record = updated;
                Ok(true)
            }
            None => Err(Error::PaymentNotFound(updated.id)),
        }
    }
}
