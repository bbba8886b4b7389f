use crate::DbError;
use crate::repository::{ITEM_COLUMNS, item_from_row};
use analytics::quantile::{MEDIAN, P90};
use analytics::{AnalyticsSnapshot, AnalyticsStore, DateRange, StoreError};
use async_trait::async_trait;
use core_types::{Aggregate, Item, ItemKind};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{Row, Transaction};

/// Summary statistics for one item type. The percentile results are `float8`
/// in Postgres; casting back to `numeric` keeps exact values such as `37`.
const AGGREGATE_SQL: &str = r#"
    SELECT
        COALESCE(SUM(amount), 0) AS sum,
        COALESCE(AVG(amount), 0) AS avg,
        COUNT(*) AS count,
        COALESCE(PERCENTILE_CONT($4::float8) WITHIN GROUP (ORDER BY amount), 0)::numeric AS median,
        COALESCE(PERCENTILE_CONT($5::float8) WITHIN GROUP (ORDER BY amount), 0)::numeric AS percent90
    FROM items
    WHERE type = $1 AND date BETWEEN $2 AND $3
"#;

/// An `AnalyticsStore` backed by PostgreSQL.
///
/// Each snapshot is a read-only `REPEATABLE READ` transaction, so the two
/// aggregate statements and the detail statement all see the same data even
/// while other sessions write.
#[derive(Debug, Clone)]
pub struct PgAnalyticsStore {
    pool: PgPool,
}

impl PgAnalyticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsStore for PgAnalyticsStore {
    async fn begin(&self) -> Result<Box<dyn AnalyticsSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;

        tracing::debug!("Analytics snapshot opened");
        Ok(Box::new(PgSnapshot { tx }))
    }
}

/// One open snapshot. Dropping it without `commit` rolls the transaction back.
struct PgSnapshot {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AnalyticsSnapshot for PgSnapshot {
    async fn aggregate(&mut self, kind: ItemKind, range: &DateRange) -> Result<Aggregate, StoreError> {
        let row = sqlx::query(AGGREGATE_SQL)
            .bind(kind.as_str())
            .bind(range.start())
            .bind(range.end())
            .bind(to_fraction(MEDIAN))
            .bind(to_fraction(P90))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        let aggregate = Aggregate {
            sum: row.try_get("sum").map_err(DbError::from)?,
            avg: row.try_get("avg").map_err(DbError::from)?,
            count: row.try_get("count").map_err(DbError::from)?,
            median: row.try_get("median").map_err(DbError::from)?,
            percent90: row.try_get("percent90").map_err(DbError::from)?,
        };
        tracing::debug!(kind = %kind, count = aggregate.count, "Aggregate computed");
        Ok(aggregate)
    }

    async fn details(&mut self, range: &DateRange) -> Result<Vec<Item>, StoreError> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE date BETWEEN $1 AND $2 ORDER BY date DESC, id DESC"
        );
        let rows = sqlx::query(&query)
            .bind(range.start())
            .bind(range.end())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;
        Ok(items)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(DbError::from)?;
        Ok(())
    }
}

/// The quantile constants are exact decimals; Postgres wants a `float8` fraction.
fn to_fraction(q: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    q.to_f64().unwrap_or_default()
}
