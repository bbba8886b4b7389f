//! An in-process `AnalyticsStore` used as a test double.
//!
//! Items live in a copy-on-write `Arc<Vec<Item>>`: writers replace the vector,
//! and a snapshot simply keeps the `Arc` it saw when it began. Faults and
//! per-query delays can be injected to exercise the engine's failure paths.

use crate::error::StoreError;
use crate::quantile;
use crate::range::DateRange;
use crate::store::{AnalyticsSnapshot, AnalyticsStore};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Aggregate, Item, ItemKind, NewItem};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// The step of a snapshot at which an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Begin,
    Aggregate(ItemKind),
    Details,
    Commit,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    step: Step,
    transient: bool,
}

/// Counters of how snapshots ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

#[derive(Debug, Default)]
struct Shared {
    items: RwLock<Arc<Vec<Item>>>,
    next_id: AtomicI64,
    faults: Mutex<Vec<Fault>>,
    query_delay: Mutex<Option<Duration>>,
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl Shared {
    /// Consumes the first pending fault registered for `step`, if any.
    fn take_fault(&self, step: Step) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = faults.iter().position(|fault| fault.step == step) else {
            return Ok(());
        };
        let fault = faults.remove(index);
        let cause = format!("injected fault at {step:?}");
        Err(if fault.transient {
            StoreError::transient(cause)
        } else {
            StoreError::failed(cause)
        })
    }

    async fn pause(&self) {
        let delay = *self.query_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn modify<R>(&self, change: impl FnOnce(&mut Vec<Item>) -> R) -> R {
        let mut guard = self.items.write().unwrap_or_else(PoisonError::into_inner);
        change(Arc::make_mut(&mut guard))
    }
}

/// A cheaply cloneable in-memory item store with snapshot reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item, assigning the next id and both store timestamps.
    pub fn insert(&self, new: NewItem) -> Item {
        let now = Utc::now();
        let item = Item {
            id: self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            kind: new.kind,
            amount: new.amount,
            occurred_at: new.occurred_at,
            category: new.category,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        self.shared.modify(|items| items.push(item.clone()));
        item
    }

    /// Replaces the caller-supplied fields of an item. Returns `None` for an unknown id.
    pub fn update(&self, id: i64, new: NewItem) -> Option<Item> {
        self.shared.modify(|items| {
            let item = items.iter_mut().find(|item| item.id == id)?;
            item.kind = new.kind;
            item.amount = new.amount;
            item.occurred_at = new.occurred_at;
            item.category = new.category;
            item.description = new.description;
            item.updated_at = Utc::now();
            Some(item.clone())
        })
    }

    /// Returns whether an item was removed.
    pub fn delete(&self, id: i64) -> bool {
        self.shared.modify(|items| {
            let before = items.len();
            items.retain(|item| item.id != id);
            items.len() != before
        })
    }

    pub fn len(&self) -> usize {
        self.shared.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next snapshot operation at `step` fail once.
    pub fn inject_fault(&self, step: Step, transient: bool) {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault { step, transient });
    }

    /// Every snapshot query sleeps for `delay` before answering.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *self.shared.query_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            begun: self.shared.begun.load(Ordering::SeqCst),
            committed: self.shared.committed.load(Ordering::SeqCst),
            rolled_back: self.shared.rolled_back.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn AnalyticsSnapshot>, StoreError> {
        self.shared.take_fault(Step::Begin)?;
        let items = self
            .shared
            .items
            .read()
            .map_err(|_e| StoreError::Internal("item store lock poisoned".to_string()))?
            .clone();
        self.shared.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySnapshot {
            items,
            shared: Arc::clone(&self.shared),
            finished: false,
        }))
    }
}

struct MemorySnapshot {
    items: Arc<Vec<Item>>,
    shared: Arc<Shared>,
    finished: bool,
}

impl MemorySnapshot {
    fn in_range<'a>(&'a self, range: &'a DateRange) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |item| range.contains(item.occurred_at))
    }
}

#[async_trait]
impl AnalyticsSnapshot for MemorySnapshot {
    async fn aggregate(&mut self, kind: ItemKind, range: &DateRange) -> Result<Aggregate, StoreError> {
        self.shared.pause().await;
        self.shared.take_fault(Step::Aggregate(kind))?;
        let amounts = self
            .in_range(range)
            .filter(|item| item.kind == kind)
            .map(|item| item.amount)
            .collect();
        Ok(quantile::aggregate(amounts))
    }

    async fn details(&mut self, range: &DateRange) -> Result<Vec<Item>, StoreError> {
        self.shared.pause().await;
        self.shared.take_fault(Step::Details)?;
        let mut details: Vec<Item> = self.in_range(range).cloned().collect();
        details.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(details)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        // A failed commit leaves `finished` unset, so the drop records a rollback.
        this.shared.take_fault(Step::Commit)?;
        this.finished = true;
        this.shared.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.finished = true;
        this.shared.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn march() -> DateRange {
        DateRange::new(Some(at(1)), Some(at(31)), ChronoDuration::days(365)).unwrap()
    }

    #[tokio::test]
    async fn snapshot_ignores_later_writes() {
        let store = MemoryStore::new();
        store.insert(NewItem::new(ItemKind::Income, dec!(10), at(2)));

        let mut snapshot = store.begin().await.unwrap();
        store.insert(NewItem::new(ItemKind::Income, dec!(20), at(3)));

        let agg = snapshot.aggregate(ItemKind::Income, &march()).await.unwrap();
        assert_eq!(agg.count, 1);
        assert_eq!(snapshot.details(&march()).await.unwrap().len(), 1);
        snapshot.commit().await.unwrap();

        let mut fresh = store.begin().await.unwrap();
        assert_eq!(fresh.details(&march()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn details_break_ties_by_newest_insert() {
        let store = MemoryStore::new();
        let first = store.insert(NewItem::new(ItemKind::Income, dec!(1), at(5)));
        let second = store.insert(NewItem::new(ItemKind::Expense, dec!(2), at(5)));
        let older = store.insert(NewItem::new(ItemKind::Income, dec!(3), at(4)));

        let mut snapshot = store.begin().await.unwrap();
        let ids: Vec<i64> = snapshot
            .details(&march())
            .await
            .unwrap()
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id, older.id]);
    }

    #[tokio::test]
    async fn update_and_delete_touch_only_their_item() {
        let store = MemoryStore::new();
        let item = store.insert(NewItem::new(ItemKind::Income, dec!(10), at(2)));
        let other = store.insert(NewItem::new(ItemKind::Income, dec!(11), at(2)));

        let updated = store
            .update(item.id, NewItem::new(ItemKind::Expense, dec!(99), at(3)).with_category("rent"))
            .unwrap();
        assert_eq!(updated.kind, ItemKind::Expense);
        assert_eq!(updated.created_at, item.created_at);
        assert!(updated.updated_at >= item.updated_at);
        assert!(store.update(404, NewItem::new(ItemKind::Income, dec!(1), at(1))).is_none());

        assert!(store.delete(other.id));
        assert!(!store.delete(other.id));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let store = MemoryStore::new();
        store.inject_fault(Step::Begin, true);

        assert!(matches!(store.begin().await, Err(StoreError::Transient(_))));
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_snapshot_counts_as_rollback() {
        let store = MemoryStore::new();
        drop(store.begin().await.unwrap());
        store.begin().await.unwrap().commit().await.unwrap();

        assert_eq!(
            store.stats(),
            SnapshotStats {
                begun: 2,
                committed: 1,
                rolled_back: 1
            }
        );
    }
}
