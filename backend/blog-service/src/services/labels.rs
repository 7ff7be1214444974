/// Tag and category counters
///
/// Post saves record label uses here. A counter failure never fails the
/// save; it is logged with the labels to replay, counted in metrics and left
/// for reconciliation.
use crate::config::LabelConfig;
use crate::metrics;
use label_counter::{
    tally_labels, CounterConfig, LabelCounter, LabelKind, LabelResult, LabelStore, PgLabelStore,
    ReconcileReport, RecordUsesError,
};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// One counter per label kind
pub struct LabelCounters<S: LabelStore = PgLabelStore> {
    tags: LabelCounter<S>,
    categories: LabelCounter<S>,
}

impl LabelCounters<PgLabelStore> {
    /// Postgres-backed counters for the `tags` and `categories` tables
    pub fn postgres(pool: PgPool, config: &LabelConfig) -> Self {
        let counter_config = CounterConfig {
            op_timeout: config.op_timeout(),
            max_conflict_retries: config.max_conflict_retries,
        };

        Self::new(
            LabelCounter::with_config(
                Arc::new(PgLabelStore::new(pool.clone(), LabelKind::Tag)),
                counter_config.clone(),
            ),
            LabelCounter::with_config(
                Arc::new(PgLabelStore::new(pool, LabelKind::Category)),
                counter_config,
            ),
        )
    }
}

impl<S: LabelStore> LabelCounters<S> {
    pub fn new(tags: LabelCounter<S>, categories: LabelCounter<S>) -> Self {
        Self { tags, categories }
    }

    pub fn counter(&self, kind: LabelKind) -> &LabelCounter<S> {
        match kind {
            LabelKind::Tag => &self.tags,
            LabelKind::Category => &self.categories,
        }
    }

    /// Count the labels of a freshly saved post.
    ///
    /// Returns whatever could not be recorded, after logging it.
    pub async fn record_post_labels(
        &self,
        post_id: i64,
        categories: &[String],
        tags: &[String],
    ) -> Vec<(LabelKind, RecordUsesError)> {
        let (category_result, tag_result) = tokio::join!(
            self.categories.record_uses(categories),
            self.tags.record_uses(tags)
        );

        let failures: Vec<(LabelKind, RecordUsesError)> = [
            (LabelKind::Category, category_result),
            (LabelKind::Tag, tag_result),
        ]
        .into_iter()
        .filter_map(|(kind, result)| result.err().map(|e| (kind, e)))
        .collect();

        for (kind, err) in &failures {
            for failure in &err.failures {
                metrics::record_label_count_failure(*kind, &failure.error);
            }
            warn!(
                post_id,
                kind = %kind,
                labels = ?err.failed_names(),
                replay = ?err.retry_input(),
                error = %err,
                "Label counts not updated for saved post"
            );
        }

        failures
    }

    /// Reset one kind's counts to what the given label lists contain
    pub async fn reconcile_from_lists(
        &self,
        kind: LabelKind,
        lists: &[String],
    ) -> LabelResult<ReconcileReport> {
        let actual: HashMap<String, i64> = tally_labels(
            lists
                .iter()
                .flat_map(|list| list.split(','))
                .collect::<Vec<_>>(),
        )
        .into_iter()
        .collect();

        let report = self.counter(kind).reconcile(&actual).await?;
        if !report.failed.is_empty() {
            metrics::record_reconcile_failures(kind, report.failed.len());
        }

        Ok(report)
    }
}

impl<S: LabelStore + 'static> LabelCounters<S> {
    /// Count a saved post's labels on a separate task.
    ///
    /// The task runs to completion and logs its own failures even when the
    /// returned handle is dropped, e.g. with a cancelled request.
    pub fn spawn_record_post_labels(
        self: &Arc<Self>,
        post_id: i64,
        categories: Vec<String>,
        tags: Vec<String>,
    ) -> JoinHandle<Vec<(LabelKind, RecordUsesError)>> {
        let counters = Arc::clone(self);
        tokio::spawn(async move {
            counters
                .record_post_labels(post_id, &categories, &tags)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use label_counter::{Fault, InMemoryLabelStore, StoreOp};
    use std::time::Duration;

    fn memory_counters() -> (
        Arc<InMemoryLabelStore>,
        Arc<InMemoryLabelStore>,
        LabelCounters<InMemoryLabelStore>,
    ) {
        let tags = Arc::new(InMemoryLabelStore::new());
        let categories = Arc::new(InMemoryLabelStore::new());
        let counters = LabelCounters::new(
            LabelCounter::new(tags.clone()),
            LabelCounter::new(categories.clone()),
        );
        (tags, categories, counters)
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_record_post_labels_updates_both_tables() {
        let (tags, categories, counters) = memory_counters();

        let failures = counters
            .record_post_labels(1, &labels(&["Tech", "Life"]), &labels(&["rust", "rust"]))
            .await;

        assert!(failures.is_empty());
        assert_eq!(categories.records_named("Tech")[0].count, 1);
        assert_eq!(categories.records_named("Life")[0].count, 1);
        assert_eq!(tags.records_named("rust")[0].count, 2);
    }

    #[tokio::test]
    async fn test_record_post_labels_reports_failures_per_kind() {
        let (tags, categories, counters) = memory_counters();
        tags.inject(StoreOp::Find, Fault::Fail);

        let failures = counters
            .record_post_labels(1, &labels(&["Tech"]), &labels(&["rust"]))
            .await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, LabelKind::Tag);
        assert_eq!(failures[0].1.failed_names(), vec!["rust"]);
        assert_eq!(categories.records_named("Tech")[0].count, 1);
        assert!(tags.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_from_lists() {
        let (_, categories, counters) = memory_counters();
        categories.seed("Tech", 9);
        categories.seed("Gone", 2);

        let report = counters
            .reconcile_from_lists(
                LabelKind::Category,
                &labels(&["Tech, Life", "Tech", " ,Life"]),
            )
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.zeroed, 1);
        assert_eq!(categories.records_named("Tech")[0].count, 2);
        assert_eq!(categories.records_named("Life")[0].count, 2);
        assert_eq!(categories.records_named("Gone")[0].count, 0);
    }

    #[tokio::test]
    async fn test_spawned_counting_survives_dropped_caller() {
        let tags = Arc::new(InMemoryLabelStore::new().with_latency(Duration::from_millis(30)));
        let categories =
            Arc::new(InMemoryLabelStore::new().with_latency(Duration::from_millis(30)));
        let counters = Arc::new(LabelCounters::new(
            LabelCounter::new(tags.clone()),
            LabelCounter::new(categories.clone()),
        ));

        let caller = tokio::time::timeout(
            Duration::from_millis(10),
            counters.spawn_record_post_labels(7, labels(&["Tech", "Life"]), labels(&["rust"])),
        )
        .await;
        assert!(caller.is_err());
        assert!(categories.snapshot().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(categories.records_named("Tech")[0].count, 1);
        assert_eq!(categories.records_named("Life")[0].count, 1);
        assert_eq!(tags.records_named("rust")[0].count, 1);
    }

    #[tokio::test]
    async fn test_spawned_counting_returns_failures() {
        let (tags, _, counters) = memory_counters();
        tags.inject(StoreOp::Find, Fault::Fail);
        let counters = Arc::new(counters);

        let failures = counters
            .spawn_record_post_labels(1, labels(&["Tech"]), labels(&["rust"]))
            .await
            .unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, LabelKind::Tag);
        assert!(crate::metrics::label_count_failures(LabelKind::Tag, "unavailable") >= 1);
    }

    #[tokio::test]
    async fn test_reconcile_from_lists_reports_failed_labels() {
        let (_, categories, counters) = memory_counters();
        categories.seed("Life", 4);
        categories.inject(StoreOp::Insert, Fault::Fail);

        let report = counters
            .reconcile_from_lists(LabelKind::Category, &labels(&["Tech,Life"]))
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["Tech".to_string()]);
        assert_eq!(categories.records_named("Life")[0].count, 1);
    }
}
