use crate::enums::ItemKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single income or expense record as held by the item store.
///
/// `occurred_at` is the business timestamp that every range query and ordering
/// is based on. `created_at` and `updated_at` are maintained by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub kind: ItemKind,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller-supplied part of an item, used for both inserts and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub kind: ItemKind,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewItem {
    pub fn new(kind: ItemKind, amount: Decimal, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            amount,
            occurred_at,
            category: None,
            description: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Summary statistics over the `amount` of one kind of item in a window.
///
/// Derived on demand and never persisted. Every field is zero for an empty set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub sum: Decimal,
    pub avg: Decimal,
    pub count: i64,
    pub median: Decimal,
    pub percent90: Decimal,
}

impl Aggregate {
    /// The aggregate of an empty set.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The result of one analytics query: both aggregates and the matching items,
/// all observed from the same snapshot of the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Analytics {
    pub income: Aggregate,
    pub expense: Aggregate,
    /// Ordered by `occurred_at` descending, newest insert first on ties.
    pub details: Vec<Item>,
}

impl Analytics {
    pub fn aggregate(&self, kind: ItemKind) -> &Aggregate {
        match kind {
            ItemKind::Income => &self.income,
            ItemKind::Expense => &self.expense,
        }
    }

    /// Number of detail rows of the given kind.
    pub fn detail_count(&self, kind: ItemKind) -> usize {
        self.details.iter().filter(|item| item.kind == kind).count()
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Zero-based row offset of the first item on `page` (pages start at 1).
    pub fn offset(page: u32, limit: u32) -> i64 {
        i64::from(page.saturating_sub(1)) * i64::from(limit)
    }
}
