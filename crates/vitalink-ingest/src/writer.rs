//! Conflict-aware bulk writer
//!
//! Persists a batch through three tiers, stopping at the first that works:
//!
//! 1. one multi-row insert (through the retry executor)
//! 2. one upsert on the caller's conflict key, when a key was given
//! 3. one insert per record, chunk by chunk, keeping whatever succeeds
//!
//! Tier 3 reports partial success as success; the shortfall only shows up in
//! the message. The record loop is sequential so the success/failure
//! bookkeeping stays simple.

use std::sync::Arc;

use crate::events::{EventSink, RecoveryEvent, WriteTier};
use crate::recovery::{RecoveryResult, RetryExecutor, RetryPolicy};
use crate::storage::{ConflictKey, RecordStore};

/// Default number of records per tier-3 chunk
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    pub batch_size: usize,
    /// Policy for the tier-1 batch insert. One attempt by default, so a
    /// failing batch falls through to the upsert immediately.
    pub batch_policy: RetryPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_policy: RetryPolicy::once(),
        }
    }
}

pub struct BulkWriter<S> {
    store: S,
    executor: RetryExecutor,
    config: WriterConfig,
}

impl<S> BulkWriter<S> {
    pub fn new(store: S, executor: RetryExecutor, config: WriterConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn sink(&self) -> &Arc<dyn EventSink> {
        self.executor.sink()
    }

    /// Persist `records`, degrading tier by tier. Never returns an error;
    /// `data` holds only rows the store confirmed.
    pub async fn write_with_recovery<R>(
        &self,
        records: &[R],
        conflict_key: Option<&ConflictKey>,
        context: &str,
    ) -> RecoveryResult<Vec<R>>
    where
        S: RecordStore<R>,
        R: Send + Sync,
    {
        if records.is_empty() {
            return RecoveryResult::ok(Vec::new());
        }

        // Tier 1
        let batch = self
            .executor
            .run(context, &self.config.batch_policy, || self.store.insert_batch(records))
            .await;

        if let Some(inserted) = batch.into_data() {
            self.tier_succeeded(context, WriteTier::Batch, inserted.len());
            return RecoveryResult::ok(inserted);
        }
        self.tier_failed(context, WriteTier::Batch, "batch insert exhausted its attempts");

        // Tier 2
        if let Some(key) = conflict_key {
            match self.store.upsert(records, key).await {
                Ok(upserted) => {
                    self.tier_succeeded(context, WriteTier::Upsert, upserted.len());
                    return RecoveryResult::recovered(
                        upserted,
                        format!("{} resolved conflicts automatically", context),
                    );
                },
                Err(e) => self.tier_failed(context, WriteTier::Upsert, &e.to_string()),
            }
        }

        // Tier 3
        let mut stored = Vec::new();
        let mut failed = 0usize;

        for (chunk_index, chunk) in records.chunks(self.config.batch_size.max(1)).enumerate() {
            for (offset, record) in chunk.iter().enumerate() {
                match self.store.insert_one(record).await {
                    Ok(row) => stored.push(row),
                    Err(e) => {
                        failed += 1;
                        self.sink().record(RecoveryEvent::RecordRejected {
                            context: context.to_string(),
                            index: chunk_index * self.config.batch_size.max(1) + offset,
                            error: e.to_string(),
                        });
                    },
                }
            }
        }

        if stored.is_empty() {
            self.tier_failed(context, WriteTier::PerRecord, "no record could be stored");
            return RecoveryResult::failed(format!("{} failed completely", context));
        }

        self.tier_succeeded(context, WriteTier::PerRecord, stored.len());

        let message = if failed > 0 {
            format!("{} completed with {} items needing review", context, failed)
        } else {
            format!("{} completed", context)
        };

        RecoveryResult::recovered(stored, message)
    }

    fn tier_succeeded(&self, context: &str, tier: WriteTier, stored: usize) {
        self.sink().record(RecoveryEvent::TierSucceeded {
            context: context.to_string(),
            tier,
            stored,
        });
    }

    fn tier_failed(&self, context: &str, tier: WriteTier, error: &str) {
        self.sink().record(RecoveryEvent::TierFailed {
            context: context.to_string(),
            tier,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::storage::StoreError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted store: each tier either fails or succeeds, and individual
    /// inserts fail for the listed values.
    #[derive(Default)]
    struct ScriptedStore {
        batch_fails: bool,
        upsert_fails: bool,
        rejected: Vec<u32>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedStore {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl RecordStore<u32> for ScriptedStore {
        async fn insert_batch(&self, records: &[u32]) -> Result<Vec<u32>, StoreError> {
            self.log("batch");
            if self.batch_fails {
                Err(StoreError::Rejected("duplicate key".into()))
            } else {
                Ok(records.to_vec())
            }
        }

        async fn upsert(
            &self,
            records: &[u32],
            _key: &ConflictKey,
        ) -> Result<Vec<u32>, StoreError> {
            self.log("upsert");
            if self.upsert_fails {
                Err(StoreError::Rejected("no unique index".into()))
            } else {
                Ok(records.to_vec())
            }
        }

        async fn insert_one(&self, record: &u32) -> Result<u32, StoreError> {
            self.log("one");
            if self.rejected.contains(record) {
                Err(StoreError::Rejected(format!("bad record {}", record)))
            } else {
                Ok(*record)
            }
        }
    }

    fn writer(
        store: ScriptedStore,
        batch_size: usize,
    ) -> (BulkWriter<ScriptedStore>, MemoryEventSink) {
        let sink = MemoryEventSink::new();
        let config = WriterConfig {
            batch_size,
            ..WriterConfig::default()
        };
        (
            BulkWriter::new(store, RetryExecutor::new(Arc::new(sink.clone())), config),
            sink,
        )
    }

    fn key() -> ConflictKey {
        "user_id,report_id,marker_name".parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_touches_nothing() {
        let (writer, sink) = writer(ScriptedStore::default(), 50);

        let result = writer
            .write_with_recovery::<u32>(&[], Some(&key()), "Biomarker storage")
            .await;

        assert!(result.is_success());
        assert!(!result.is_recovered());
        assert_eq!(result.into_data(), Some(vec![]));
        assert!(writer.store().calls().is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_batch_success_is_not_recovered() {
        let (writer, _) = writer(ScriptedStore::default(), 50);

        let result = writer
            .write_with_recovery(&[1, 2, 3], Some(&key()), "Biomarker storage")
            .await;

        assert!(result.is_success());
        assert!(!result.is_recovered());
        assert_eq!(result.into_data(), Some(vec![1, 2, 3]));
        assert_eq!(writer.store().calls(), vec!["batch"]);
    }

    #[tokio::test]
    async fn test_upsert_runs_once_after_single_batch_attempt() {
        let store = ScriptedStore {
            batch_fails: true,
            ..Default::default()
        };
        let (writer, _) = writer(store, 50);

        let result = writer.write_with_recovery(&[1, 2], Some(&key()), "Biomarker storage").await;

        assert_eq!(writer.store().calls(), vec!["batch", "upsert"]);
        assert!(result.is_success());
        assert!(result.is_recovered());
        assert_eq!(
            result.message(),
            Some("Biomarker storage resolved conflicts automatically")
        );
    }

    #[tokio::test]
    async fn test_without_conflict_key_skips_upsert() {
        let store = ScriptedStore {
            batch_fails: true,
            ..Default::default()
        };
        let (writer, _) = writer(store, 50);

        let result = writer.write_with_recovery(&[1, 2], None, "SNP storage").await;

        assert_eq!(writer.store().calls(), vec!["batch", "one", "one"]);
        assert_eq!(result.message(), Some("SNP storage completed"));
        assert!(result.is_recovered());
    }

    #[tokio::test]
    async fn test_partial_success_counts_as_success() {
        let store = ScriptedStore {
            batch_fails: true,
            upsert_fails: true,
            rejected: vec![2, 4],
            ..Default::default()
        };
        let (writer, sink) = writer(store, 2);

        let result = writer
            .write_with_recovery(&[1, 2, 3, 4, 5], Some(&key()), "Biomarker storage")
            .await;

        assert!(result.is_success());
        assert!(result.is_recovered());
        assert_eq!(
            result.message(),
            Some("Biomarker storage completed with 2 items needing review")
        );
        assert_eq!(result.into_data(), Some(vec![1, 3, 5]));

        let rejected: Vec<usize> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                RecoveryEvent::RecordRejected { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_every_record_failing_is_total_failure() {
        let store = ScriptedStore {
            batch_fails: true,
            upsert_fails: true,
            rejected: vec![1, 2, 3],
            ..Default::default()
        };
        let (writer, _) = writer(store, 50);

        let result = writer.write_with_recovery(&[1, 2, 3], Some(&key()), "SNP storage").await;

        assert!(!result.is_success());
        assert!(!result.is_recovered());
        assert!(result.data().is_none());
        assert_eq!(result.message(), Some("SNP storage failed completely"));
        assert_eq!(
            writer.store().calls(),
            vec!["batch", "upsert", "one", "one", "one"]
        );
    }
}
