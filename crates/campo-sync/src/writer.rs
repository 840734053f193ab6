//! Batched upsert of normalized records by `sync_key`.

use std::sync::Arc;

use campo_core::NormalizedRecord;
use campo_storage::ProgramStore;
use tracing::{debug, warn};

pub const DEFAULT_WRITE_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows in batches the store accepted. Inserts and overwrites are not
    /// distinguished, so every accepted row lands here.
    pub created: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub errors: Vec<String>,
}

pub struct ReconciliationWriter {
    store: Arc<dyn ProgramStore>,
    batch_size: usize,
}

impl ReconciliationWriter {
    pub fn new(store: Arc<dyn ProgramStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes every batch in order. A failed batch is recorded and the
    /// remaining batches are still attempted.
    pub async fn write(&self, records: &[NormalizedRecord]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let batch_no = index + 1;
            let first = index * self.batch_size + 1;
            let last = first + batch.len() - 1;
            outcome.batches += 1;

            match self.store.upsert_applications(batch).await {
                Ok(()) => {
                    debug!(batch = batch_no, rows = batch.len(), "batch upserted");
                    outcome.created += batch.len();
                }
                Err(err) => {
                    warn!(batch = batch_no, first, last, error = %err, "batch upsert failed");
                    outcome.failed_batches += 1;
                    outcome
                        .errors
                        .push(format!("batch {batch_no} (records {first}-{last}): {err}"));
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campo_core::{SyncState, STATUS_PROGRAMMED};
    use campo_storage::{MemoryProgramStore, StoreError};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn records(n: usize) -> Vec<NormalizedRecord> {
        (0..n)
            .map(|i| NormalizedRecord {
                partition_id: "alm-1".into(),
                week: 8,
                date: NaiveDate::from_ymd_opt(2026, 2, 24).unwrap(),
                variety: "BILOXI".into(),
                derived_sectors: vec![],
                product_name: format!("Producto {i}"),
                dose_per_200l: 1.0,
                drum_count: 1,
                method: "FOLIAR".into(),
                objective: None,
                status: STATUS_PROGRAMMED.into(),
                sync_key: format!("ABC_{i}"),
                source_range: format!("Programa!A{r}:J{r}", r = i + 2),
                synced_at: Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap(),
            })
            .collect()
    }

    /// Fails the upsert call with the given 1-based index.
    struct FailNthBatch {
        inner: MemoryProgramStore,
        fail_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProgramStore for FailNthBatch {
        async fn upsert_applications(&self, batch: &[NormalizedRecord]) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(StoreError::Rejected("payload too large".into()));
            }
            self.inner.upsert_applications(batch).await
        }

        async fn record_sync(
            &self,
            partition_id: &str,
            synced_at: DateTime<Utc>,
            rows: u64,
        ) -> Result<(), StoreError> {
            self.inner.record_sync(partition_id, synced_at, rows).await
        }

        async fn load_sync_state(&self, partition_id: &str) -> Result<Option<SyncState>, StoreError> {
            self.inner.load_sync_state(partition_id).await
        }
    }

    #[tokio::test]
    async fn records_are_split_into_fixed_size_batches() {
        let store = Arc::new(MemoryProgramStore::new());
        let writer = ReconciliationWriter::new(store.clone(), 2);
        let outcome = writer.write(&records(5)).await;

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.created, 5);
        assert!(outcome.errors.is_empty());
        assert_eq!(store.write_calls(), 3);
        assert_eq!(store.records().await.len(), 5);
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_later_batches() {
        let store = Arc::new(FailNthBatch {
            inner: MemoryProgramStore::new(),
            fail_on: 2,
            calls: AtomicUsize::new(0),
        });
        let writer = ReconciliationWriter::new(store.clone(), 2);
        let outcome = writer.write(&records(5)).await;

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.created, 3);
        assert_eq!(outcome.errors, vec!["batch 2 (records 3-4): payload too large".to_string()]);

        let keys: Vec<_> = store
            .inner
            .records()
            .await
            .into_iter()
            .map(|r| r.sync_key)
            .collect();
        assert_eq!(keys, vec!["ABC_0", "ABC_1", "ABC_4"]);
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let writer = ReconciliationWriter::new(Arc::new(MemoryProgramStore::new()), 0);
        assert_eq!(writer.batch_size(), 1);
        assert_eq!(writer.write(&[]).await, WriteOutcome::default());
    }
}
