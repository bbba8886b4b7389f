use crate::DbError;
use analytics::RetryPolicy;
use core_types::{Item, ItemKind, NewItem, Page};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;
/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Column list shared by every query that returns whole items.
pub(crate) const ITEM_COLUMNS: &str =
    "id, type, amount, date, category, description, created_at, updated_at";

/// Maps a row selected with [`ITEM_COLUMNS`] into an `Item`.
pub(crate) fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    let kind: String = row.try_get("type")?;
    let kind = kind.parse::<ItemKind>().map_err(|e| sqlx::Error::ColumnDecode {
        index: "type".to_string(),
        source: Box::new(e),
    })?;

    Ok(Item {
        id: row.try_get("id")?,
        kind,
        amount: row.try_get("amount")?,
        occurred_at: row.try_get("date")?,
        category: row.try_get("category")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// The `ItemRepository` provides a high-level interface to the `items` table.
///
/// Every method is a single autocommit statement (or, for listing, two
/// independent reads), so transient failures are retried with the configured
/// policy.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl ItemRepository {
    /// Creates a new `ItemRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Inserts a new item and returns its id.
    pub async fn create(&self, item: &NewItem) -> Result<i64, DbError> {
        let id = self.retry.run("create item", || self.insert(item)).await?;
        tracing::debug!(id, kind = %item.kind, "Item created");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Item, DbError> {
        self.retry.run("get item", || self.select_one(id)).await
    }

    /// One page of items, newest first. `page` starts at 1; `limit` is
    /// clamped to `1..=MAX_PAGE_LIMIT`.
    pub async fn list_page(&self, page: u32, limit: u32) -> Result<Page<Item>, DbError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let total = self.retry.run("count items", || self.count()).await?;
        let items = self
            .retry
            .run("list items", || self.select_page(page, limit))
            .await?;

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// Replaces the caller-supplied fields of an item and bumps `updated_at`.
    pub async fn update(&self, id: i64, item: &NewItem) -> Result<(), DbError> {
        self.retry.run("update item", || self.update_row(id, item)).await?;
        tracing::debug!(id, "Item updated");
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        self.retry.run("delete item", || self.delete_row(id)).await?;
        tracing::debug!(id, "Item deleted");
        Ok(())
    }

    async fn insert(&self, item: &NewItem) -> Result<i64, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO items (type, amount, date, category, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(item.kind.as_str())
        .bind(item.amount)
        .bind(item.occurred_at)
        .bind(item.category.as_deref())
        .bind(item.description.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn select_one(&self, id: i64) -> Result<Item, DbError> {
        let query = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(item_from_row(&row)?)
    }

    async fn count(&self) -> Result<i64, DbError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn select_page(&self, page: u32, limit: u32) -> Result<Vec<Item>, DbError> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY date DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&query)
            .bind(i64::from(limit))
            .bind(Page::<Item>::offset(page, limit))
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn update_row(&self, id: i64, item: &NewItem) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET type = $1, amount = $2, date = $3, category = $4, description = $5,
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(item.kind.as_str())
        .bind(item.amount)
        .bind(item.occurred_at)
        .bind(item.category.as_deref())
        .bind(item.description.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn delete_row(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
