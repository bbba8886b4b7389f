use crate::error::StoreError;
use crate::range::DateRange;
use async_trait::async_trait;
use core_types::{Aggregate, Item, ItemKind};

/// The read capability the analytics engine needs from a transaction store.
///
/// Implemented by the PostgreSQL store in production and by
/// [`MemoryStore`](crate::memory::MemoryStore) in tests.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Opens a read-only view pinned to one point in time.
    async fn begin(&self) -> Result<Box<dyn AnalyticsSnapshot>, StoreError>;
}

/// A point-in-time view of the store. Every query issued through the same
/// snapshot observes the same data, regardless of concurrent writes.
///
/// Dropping a snapshot without calling `commit` or `rollback` must release it
/// as if it had been rolled back.
#[async_trait]
pub trait AnalyticsSnapshot: Send {
    /// Sum, mean, count, median and 90th percentile of `amount` over the items
    /// of `kind` whose `occurred_at` falls inside `range`.
    async fn aggregate(&mut self, kind: ItemKind, range: &DateRange) -> Result<Aggregate, StoreError>;

    /// Every item inside `range`, newest `occurred_at` first and newest insert
    /// first on ties.
    async fn details(&mut self, range: &DateRange) -> Result<Vec<Item>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
