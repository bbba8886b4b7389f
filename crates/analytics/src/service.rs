use crate::error::{AnalyticsError, StoreError};
use crate::range::DateRange;
use crate::retry::RetryPolicy;
use crate::store::{AnalyticsSnapshot, AnalyticsStore};
use chrono::{DateTime, Utc};
use configuration::{AnalyticsSettings, RetrySettings};
use core_types::{Analytics, ItemKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A stateless engine that answers analytics queries against an `AnalyticsStore`.
///
/// Cloning is cheap; every call opens its own snapshot, so any number of
/// calls may run concurrently.
#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn AnalyticsStore>,
    max_period: chrono::Duration,
    query_timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl AnalyticsService {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        settings: &AnalyticsSettings,
        retry: &RetrySettings,
    ) -> Self {
        Self {
            store,
            max_period: settings.max_period(),
            query_timeout: settings.query_timeout(),
            retry: RetryPolicy::from(retry),
        }
    }

    /// Replaces the retry policy used for whole-snapshot retries.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the per-call deadline. `None` disables it.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn max_period(&self) -> chrono::Duration {
        self.max_period
    }

    /// Range validation against the configured maximum period.
    pub fn validate(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<DateRange, AnalyticsError> {
        DateRange::new(from, to, self.max_period)
    }

    /// Computes income and expense aggregates plus the detail rows for `range`,
    /// all from one snapshot of the store.
    ///
    /// Either everything is returned or a single error is: a failure in any
    /// of the three reads rolls the snapshot back. Transient storage failures
    /// restart the whole snapshot according to the retry policy.
    pub async fn get_analytics(&self, range: &DateRange) -> Result<Analytics, AnalyticsError> {
        tracing::info!(from = %range.start(), to = %range.end(), "Getting analytics");

        let result = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(range))
                .await
                .map_err(|_e| AnalyticsError::Timeout(limit))
                .and_then(|inner| inner),
            None => self.run(range).await,
        };

        match &result {
            Ok(analytics) => tracing::info!(
                income_count = analytics.income.count,
                expense_count = analytics.expense.count,
                details = analytics.details.len(),
                "Analytics retrieved"
            ),
            Err(err) => tracing::error!(error = %err, "Failed to get analytics"),
        }
        result
    }

    /// Like [`get_analytics`](Self::get_analytics), but gives up with
    /// `Cancelled` as soon as `cancel` completes. The in-flight snapshot is
    /// dropped, which rolls it back.
    pub async fn get_analytics_until<F>(
        &self,
        range: &DateRange,
        cancel: F,
    ) -> Result<Analytics, AnalyticsError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::warn!(from = %range.start(), to = %range.end(), "Analytics query cancelled");
                Err(AnalyticsError::Cancelled)
            }
            result = self.get_analytics(range) => result,
        }
    }

    async fn run(&self, range: &DateRange) -> Result<Analytics, AnalyticsError> {
        self.retry
            .run("analytics snapshot", || self.read_snapshot(range))
            .await
            .map_err(AnalyticsError::from)
    }

    /// One attempt: begin, three reads, commit. Rolls back on any read failure.
    async fn read_snapshot(&self, range: &DateRange) -> Result<Analytics, StoreError> {
        let mut snapshot = self.store.begin().await?;

        match collect(snapshot.as_mut(), range).await {
            Ok(analytics) => {
                snapshot.commit().await?;
                Ok(analytics)
            }
            Err(err) => {
                if let Err(rollback_err) = snapshot.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback after failed analytics read also failed");
                }
                Err(err)
            }
        }
    }
}

async fn collect(
    snapshot: &mut dyn AnalyticsSnapshot,
    range: &DateRange,
) -> Result<Analytics, StoreError> {
    let income = snapshot.aggregate(ItemKind::Income, range).await?;
    let expense = snapshot.aggregate(ItemKind::Expense, range).await?;
    let details = snapshot.details(range).await?;

    Ok(Analytics {
        income,
        expense,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, SnapshotStats, Step};
    use chrono::TimeZone;
    use core_types::NewItem;
    use rust_decimal_macros::dec;

    fn service(store: &MemoryStore) -> AnalyticsService {
        AnalyticsService::new(
            Arc::new(store.clone()),
            &AnalyticsSettings::default(),
            &RetrySettings::default(),
        )
        .with_retry(RetryPolicy::new(3, Duration::ZERO, 1.0))
    }

    fn january(service: &AnalyticsService) -> DateRange {
        service
            .validate(
                Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
                Some(Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()),
            )
            .unwrap()
    }

    fn seed(store: &MemoryStore) {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap();
        store.insert(NewItem::new(ItemKind::Income, dec!(100), day(1)));
        store.insert(NewItem::new(ItemKind::Expense, dec!(50), day(10)));
        store.insert(NewItem::new(ItemKind::Income, dec!(200), day(15)));
    }

    #[tokio::test]
    async fn transient_failure_mid_snapshot_restarts_the_snapshot() {
        let store = MemoryStore::new();
        seed(&store);
        store.inject_fault(Step::Details, true);

        let service = service(&store);
        let analytics = service.get_analytics(&january(&service)).await.unwrap();

        assert_eq!(analytics.details.len(), 3);
        assert_eq!(
            store.stats(),
            SnapshotStats {
                begun: 2,
                committed: 1,
                rolled_back: 1
            }
        );
    }

    #[tokio::test]
    async fn permanent_failure_rolls_back_and_is_not_retried() {
        let store = MemoryStore::new();
        seed(&store);
        store.inject_fault(Step::Aggregate(ItemKind::Expense), false);

        let service = service(&store);
        let err = service.get_analytics(&january(&service)).await.unwrap_err();

        assert!(matches!(err, AnalyticsError::Storage(StoreError::Failed(_))));
        assert_eq!(
            store.stats(),
            SnapshotStats {
                begun: 1,
                committed: 0,
                rolled_back: 1
            }
        );
    }

    #[tokio::test]
    async fn failed_begin_is_retried_before_any_snapshot_exists() {
        let store = MemoryStore::new();
        store.inject_fault(Step::Begin, true);
        store.inject_fault(Step::Begin, true);

        let service = service(&store);
        assert!(service.get_analytics(&january(&service)).await.is_ok());
        assert_eq!(store.stats().begun, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_a_storage_error() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.inject_fault(Step::Aggregate(ItemKind::Income), true);
        }

        let service = service(&store);
        let err = service.get_analytics(&january(&service)).await.unwrap_err();

        assert!(matches!(err, AnalyticsError::Storage(StoreError::Transient(_))));
        assert_eq!(store.stats().rolled_back, 3);
    }

    #[tokio::test]
    async fn failed_commit_returns_no_results() {
        let store = MemoryStore::new();
        seed(&store);
        store.inject_fault(Step::Commit, false);

        let service = service(&store);
        assert!(service.get_analytics(&january(&service)).await.is_err());
        assert_eq!(store.stats().committed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_produces_timeout_and_rolls_back() {
        let store = MemoryStore::new();
        seed(&store);
        store.set_query_delay(Some(Duration::from_secs(10)));

        let service = service(&store).with_query_timeout(Some(Duration::from_secs(1)));
        let err = service.get_analytics(&january(&service)).await.unwrap_err();

        assert!(matches!(err, AnalyticsError::Timeout(limit) if limit == Duration::from_secs(1)));
        assert_eq!(store.stats().committed, 0);
        assert_eq!(store.stats().rolled_back, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_a_slow_query() {
        let store = MemoryStore::new();
        seed(&store);
        store.set_query_delay(Some(Duration::from_secs(10)));

        let service = service(&store).with_query_timeout(None);
        let range = january(&service);
        let err = service
            .get_analytics_until(&range, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalyticsError::Cancelled));
        assert_eq!(store.stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn pending_cancellation_does_not_disturb_a_fast_query() {
        let store = MemoryStore::new();
        seed(&store);

        let service = service(&store);
        let range = january(&service);
        let analytics = service
            .get_analytics_until(&range, std::future::pending())
            .await
            .unwrap();

        assert_eq!(analytics.income.count, 2);
    }
}
