//! Exactly-once label usage counting
//!
//! When the store offers an atomic upsert-and-increment, every use is a
//! single call. Otherwise the read-then-write pair for a name runs under a
//! per-name async lock, the write is conditional on the value that was read,
//! and a duplicate-key error on insert is retried as an update.

use crate::error::{LabelError, LabelFailure, LabelResult, RecordUsesError, StoreOp};
use crate::model::{normalize_label, tally_labels, Label};
use crate::store::LabelStore;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tuning for a [`LabelCounter`]
#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Upper bound for each individual store call
    pub op_timeout: Duration,

    /// Re-reads allowed after a lost race (stale update or duplicate insert)
    pub max_conflict_retries: u32,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(3),
            max_conflict_retries: 8,
        }
    }
}

/// What reconciliation did to one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Zeroed,
    Unchanged,
}

/// Summary of a [`LabelCounter::reconcile`] run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub zeroed: usize,
    pub unchanged: usize,
    /// Labels whose count could not be set, left as they were
    pub failed: Vec<String>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created => self.created += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Zeroed => self.zeroed += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Label usage counter over a [`LabelStore`].
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct LabelCounter<S: LabelStore> {
    store: Arc<S>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: CounterConfig,
}

impl<S: LabelStore> LabelCounter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CounterConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CounterConfig) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Count one use of `name`.
    ///
    /// Blank names are ignored without touching the store. A failed lookup
    /// aborts before any write.
    pub async fn record_use(&self, name: &str) -> LabelResult<()> {
        let Some(name) = normalize_label(name) else {
            debug!("Ignoring blank label");
            return Ok(());
        };

        self.add_uses(name, 1).await.map(|_| ())
    }

    /// Count every non-blank entry of `names`, duplicates included.
    ///
    /// Distinct names are applied concurrently. On failure the error lists
    /// each label that was not recorded and how many uses it is missing;
    /// all other labels were recorded.
    pub async fn record_uses<I, N>(&self, names: I) -> Result<(), RecordUsesError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let tallies = tally_labels(names);
        if tallies.is_empty() {
            return Ok(());
        }

        let attempted = tallies.len();
        let outcomes = join_all(tallies.into_iter().map(|(name, uses)| async move {
            let result = self.add_uses(&name, uses).await;
            (name, uses, result)
        }))
        .await;

        let failures: Vec<LabelFailure> = outcomes
            .into_iter()
            .filter_map(|(name, uses, result)| {
                result.err().map(|error| LabelFailure { name, uses, error })
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        warn!(
            attempted,
            failed = failures.len(),
            labels = ?failures.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            "Some label uses were not recorded"
        );

        Err(RecordUsesError {
            attempted,
            failures,
        })
    }

    /// All labels, highest count first
    pub async fn list(&self) -> LabelResult<Vec<Label>> {
        self.call(StoreOp::List, self.store.list()).await
    }

    /// Overwrite counts with externally computed truth.
    ///
    /// Every label in `actual` ends up with exactly that count (created if
    /// missing). Stored labels absent from `actual` are set to zero; nothing
    /// is deleted. Each label is set under its lock with a conditional write,
    /// so a `record_use` that lands while reconciliation runs is not
    /// overwritten by a stale read of the row. It is still overwritten when
    /// `actual` was computed before that use was made: a post counted after
    /// its label lists were read loses its increment until the next run.
    ///
    /// A label that cannot be set is logged and listed in
    /// [`ReconcileReport::failed`]; the remaining labels are still
    /// processed. Only a failure to list the stored labels aborts. Rerunning
    /// is safe because every step sets an absolute value.
    pub async fn reconcile(&self, actual: &HashMap<String, i64>) -> LabelResult<ReconcileReport> {
        let mut targets: BTreeMap<String, i64> = self
            .list()
            .await?
            .into_iter()
            .map(|label| (label.name, 0))
            .collect();

        for (raw, count) in actual {
            if let Some(name) = normalize_label(raw) {
                *targets.entry(name.to_string()).or_insert(0) += (*count).max(0);
            }
        }

        let mut report = ReconcileReport::default();
        for (name, target) in &targets {
            match self.set_count(name, *target).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(label = %name, count = *target, error = %e, "Label count not reconciled");
                    report.failed.push(name.clone());
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            zeroed = report.zeroed,
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "Label counts reconciled"
        );

        Ok(report)
    }

    async fn add_uses(&self, name: &str, uses: i64) -> LabelResult<Label> {
        if self.store.has_atomic_increment() {
            let label = self
                .call(StoreOp::Increment, self.store.increment(name, uses))
                .await?;
            debug!(label = %name, uses, count = label.count, "Label count incremented");
            return Ok(label);
        }

        self.with_name_lock(name, self.add_uses_serialized(name, uses))
            .await
    }

    async fn add_uses_serialized(&self, name: &str, uses: i64) -> LabelResult<Label> {
        let attempts = self.config.max_conflict_retries + 1;

        for attempt in 1..=attempts {
            let existing = self
                .call(StoreOp::Find, self.store.find_by_name(name))
                .await?;

            match existing.into_iter().next() {
                Some(current) => {
                    let next = current.count + uses;
                    let updated = self
                        .call(
                            StoreOp::Update,
                            self.store.update_count(current.id, current.count, next),
                        )
                        .await?;

                    match updated {
                        Some(label) => {
                            debug!(label = %name, uses, count = label.count, "Label count incremented");
                            return Ok(label);
                        }
                        None => {
                            debug!(label = %name, attempt, "Label changed before update, re-reading");
                        }
                    }
                }
                None => match self
                    .call(StoreOp::Insert, self.store.insert(name, uses))
                    .await
                {
                    Ok(label) => {
                        debug!(label = %name, count = label.count, "Label created");
                        return Ok(label);
                    }
                    Err(e) if e.is_duplicate_key() => {
                        debug!(label = %name, attempt, "Label created concurrently, applying as update");
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        warn!(label = %name, attempts, "Label update kept conflicting");
        Err(LabelError::Contention {
            name: name.to_string(),
            attempts,
        })
    }

    async fn set_count(&self, name: &str, target: i64) -> LabelResult<ReconcileOutcome> {
        self.with_name_lock(name, self.set_count_serialized(name, target))
            .await
    }

    async fn set_count_serialized(&self, name: &str, target: i64) -> LabelResult<ReconcileOutcome> {
        let attempts = self.config.max_conflict_retries + 1;

        for attempt in 1..=attempts {
            let existing = self
                .call(StoreOp::Find, self.store.find_by_name(name))
                .await?;

            match existing.into_iter().next() {
                Some(current) if current.count == target => {
                    return Ok(ReconcileOutcome::Unchanged)
                }
                Some(current) => {
                    let updated = self
                        .call(
                            StoreOp::Update,
                            self.store.update_count(current.id, current.count, target),
                        )
                        .await?;

                    if updated.is_some() {
                        debug!(label = %name, from = current.count, to = target, "Label count reset");
                        return Ok(if target == 0 {
                            ReconcileOutcome::Zeroed
                        } else {
                            ReconcileOutcome::Updated
                        });
                    }
                }
                None if target == 0 => return Ok(ReconcileOutcome::Unchanged),
                None => match self
                    .call(StoreOp::Insert, self.store.insert(name, target))
                    .await
                {
                    Ok(_) => return Ok(ReconcileOutcome::Created),
                    Err(e) if e.is_duplicate_key() => {}
                    Err(e) => return Err(e),
                },
            }

            debug!(label = %name, attempt, "Label changed during reconciliation, re-reading");
        }

        Err(LabelError::Contention {
            name: name.to_string(),
            attempts,
        })
    }

    /// Run `fut` while holding the lock for `name`
    async fn with_name_lock<T, F>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        // Declared first so it drops last, after the clone below
        let _release = ReleaseNameLock {
            locks: &self.locks,
            name,
        };
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = mutex.lock().await;
        fut.await
    }

    async fn call<T, F>(&self, op: StoreOp, fut: F) -> LabelResult<T>
    where
        F: Future<Output = LabelResult<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op = %op,
                    timeout_ms = self.config.op_timeout.as_millis() as u64,
                    "Label store call timed out"
                );
                Err(LabelError::Timeout {
                    op,
                    after: self.config.op_timeout,
                })
            }
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}

/// Removes a per-name lock entry once no caller holds or waits on it.
///
/// Runs on drop, so a cancelled caller cleans up too.
struct ReleaseNameLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    name: &'a str,
}

impl Drop for ReleaseNameLock<'_> {
    fn drop(&mut self) {
        // Only the map's own reference left means nobody is waiting
        self.locks
            .remove_if(self.name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, InMemoryLabelStore};

    fn counter(store: InMemoryLabelStore) -> LabelCounter<InMemoryLabelStore> {
        LabelCounter::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_record_use_creates_new_label() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_use("rust").await.unwrap();

        let rows = counter.store().records_named("rust");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 1);
    }

    #[tokio::test]
    async fn test_record_use_increments_existing_label() {
        let store = InMemoryLabelStore::new();
        store.seed("rust", 7);
        let counter = counter(store);

        counter.record_use("rust").await.unwrap();

        let rows = counter.store().records_named("rust");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 8);
    }

    #[tokio::test]
    async fn test_record_use_is_not_idempotent() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_use("x").await.unwrap();
        counter.record_use("x").await.unwrap();

        assert_eq!(counter.store().records_named("x")[0].count, 2);
    }

    #[tokio::test]
    async fn test_record_use_trims_name() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_use("  rust ").await.unwrap();
        counter.record_use("rust").await.unwrap();

        assert_eq!(counter.store().records_named("rust")[0].count, 2);
    }

    #[tokio::test]
    async fn test_blank_label_is_noop() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_use("").await.unwrap();
        counter.record_use("   ").await.unwrap();

        assert!(counter.store().snapshot().is_empty());
        assert_eq!(counter.store().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_labels_are_case_sensitive() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_use("Tech").await.unwrap();
        counter.record_use("tech").await.unwrap();

        assert_eq!(counter.store().records_named("Tech").len(), 1);
        assert_eq!(counter.store().records_named("tech").len(), 1);
        assert_eq!(counter.store().snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_record_uses_counts_duplicates() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_uses(["a", "b", "a"]).await.unwrap();

        assert_eq!(counter.store().records_named("a")[0].count, 2);
        assert_eq!(counter.store().records_named("b")[0].count, 1);
    }

    #[tokio::test]
    async fn test_record_uses_empty_input() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_uses(Vec::<String>::new()).await.unwrap();
        counter.record_uses(["", "  "]).await.unwrap();

        assert_eq!(counter.store().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_treated_as_absent() {
        let store = InMemoryLabelStore::new();
        store.inject(StoreOp::Find, Fault::Fail);
        let counter = counter(store);

        let err = counter.record_use("rust").await.unwrap_err();
        assert!(matches!(err, LabelError::Unavailable(_)));
        assert!(counter.store().snapshot().is_empty());
        assert_eq!(counter.store().calls(StoreOp::Insert), 0);
    }

    #[tokio::test]
    async fn test_duplicate_insert_retries_as_update() {
        let store = InMemoryLabelStore::new();
        // Another writer creates the row between our lookup and our insert
        store.inject(StoreOp::Insert, Fault::StallBefore(Duration::from_millis(20)));
        let store = Arc::new(store);
        let counter = LabelCounter::new(store.clone());

        let racer = {
            let store = store.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                store.seed("rust", 4);
            }
        };

        let (result, _) = tokio::join!(counter.record_use("rust"), racer);
        result.unwrap();

        let rows = store.records_named("rust");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 5);
    }

    /// Store whose row always moves between read and write
    struct AlwaysStale;

    #[async_trait::async_trait]
    impl LabelStore for AlwaysStale {
        async fn find_by_name(&self, name: &str) -> LabelResult<Vec<Label>> {
            Ok(vec![Label {
                id: 1,
                name: name.to_string(),
                count: 1,
            }])
        }

        async fn insert(&self, name: &str, _count: i64) -> LabelResult<Label> {
            Err(LabelError::DuplicateKey(name.to_string()))
        }

        async fn update_count(
            &self,
            _id: i64,
            _expected: i64,
            _count: i64,
        ) -> LabelResult<Option<Label>> {
            Ok(None)
        }

        async fn list(&self) -> LabelResult<Vec<Label>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_conflicts() {
        let counter = LabelCounter::with_config(
            Arc::new(AlwaysStale),
            CounterConfig {
                max_conflict_retries: 2,
                ..Default::default()
            },
        );

        let err = counter.record_use("rust").await.unwrap_err();
        match err {
            LabelError::Contention { name, attempts } => {
                assert_eq!(name, "rust");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_locks_are_released() {
        let counter = counter(InMemoryLabelStore::new());
        counter.record_uses(["a", "b", "c"]).await.unwrap();

        assert_eq!(counter.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_releases_lock() {
        let counter = counter(InMemoryLabelStore::new().with_latency(Duration::from_millis(50)));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), counter.record_use("rust")).await;
        assert!(cancelled.is_err());
        assert_eq!(counter.held_locks(), 0);

        counter.record_use("rust").await.unwrap();
        assert_eq!(counter.held_locks(), 0);
        assert_eq!(counter.store().records_named("rust")[0].count, 1);
    }

    #[tokio::test]
    async fn test_waiting_caller_keeps_lock_entry() {
        let counter = Arc::new(counter(
            InMemoryLabelStore::new().with_latency(Duration::from_millis(20)),
        ));

        let first = tokio::spawn({
            let counter = counter.clone();
            async move { counter.record_use("rust").await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Gives up while the first caller still holds the lock
        let waiter =
            tokio::time::timeout(Duration::from_millis(5), counter.record_use("rust")).await;
        assert!(waiter.is_err());
        assert_eq!(counter.held_locks(), 1);

        first.await.unwrap().unwrap();
        assert_eq!(counter.held_locks(), 0);
        assert_eq!(counter.store().records_named("rust")[0].count, 1);
    }

    #[tokio::test]
    async fn test_atomic_store_uses_single_call() {
        let counter = counter(InMemoryLabelStore::new().with_atomic_increment());
        counter.record_uses(["a", "a", "b"]).await.unwrap();

        assert_eq!(counter.store().calls(StoreOp::Increment), 2);
        assert_eq!(counter.store().calls(StoreOp::Find), 0);
        assert_eq!(counter.store().records_named("a")[0].count, 2);
    }

    #[tokio::test]
    async fn test_reconcile_sets_truth_and_zeroes_missing() {
        let store = InMemoryLabelStore::new();
        store.seed("rust", 10);
        store.seed("go", 3);
        store.seed("zig", 0);
        let counter = counter(store);

        let actual = HashMap::from([
            ("rust".to_string(), 4),
            ("zig".to_string(), 0),
            ("wasm".to_string(), 2),
        ]);
        let report = counter.reconcile(&actual).await.unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                created: 1,
                updated: 1,
                zeroed: 1,
                unchanged: 1,
                failed: vec![],
            }
        );
        assert_eq!(counter.store().records_named("rust")[0].count, 4);
        assert_eq!(counter.store().records_named("go")[0].count, 0);
        assert_eq!(counter.store().records_named("wasm")[0].count, 2);
    }

    #[tokio::test]
    async fn test_reconcile_continues_past_failed_label() {
        let store = InMemoryLabelStore::new();
        store.seed("b", 5);
        store.seed("c", 1);
        // "a" is missing, so its insert is the only insert of the run
        store.inject(StoreOp::Insert, Fault::Fail);
        let counter = counter(store);

        let actual = HashMap::from([
            ("a".to_string(), 3),
            ("b".to_string(), 2),
            ("c".to_string(), 4),
        ]);
        let report = counter.reconcile(&actual).await.unwrap();

        assert_eq!(report.failed, vec!["a".to_string()]);
        assert_eq!(report.updated, 2);
        assert!(counter.store().records_named("a").is_empty());
        assert_eq!(counter.store().records_named("b")[0].count, 2);
        assert_eq!(counter.store().records_named("c")[0].count, 4);
        assert_eq!(counter.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_when_listing_fails() {
        let store = InMemoryLabelStore::new();
        store.seed("b", 5);
        store.inject(StoreOp::List, Fault::Fail);
        let counter = counter(store);

        let result = counter.reconcile(&HashMap::from([("b".to_string(), 1)])).await;

        assert!(result.is_err());
        assert_eq!(counter.store().records_named("b")[0].count, 5);
    }
}
