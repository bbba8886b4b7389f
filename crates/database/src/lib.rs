//! # Sales Tracker Database Crate
//!
//! This crate acts as a high-level, application-specific interface to the
//! PostgreSQL database that holds every income and expense item.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** This crate encapsulates all database-specific logic. The
//!   analytics engine only sees the `AnalyticsStore` trait; this crate provides
//!   the Postgres implementation of it.
//! - **Snapshot Reads:** Analytics run inside one read-only `REPEATABLE READ`
//!   transaction, so aggregates and detail rows always agree.
//! - **Asynchronous & Pooled:** All operations are asynchronous and share an
//!   explicitly constructed connection pool (`PgPool`).
//!
//! ## Public API
//!
//! - `connect`: Builds the connection pool from `DatabaseSettings`.
//! - `run_migrations`: Applies the embedded schema migrations.
//! - `ItemRepository`: Create, read, list, update and delete items.
//! - `PgAnalyticsStore`: The `AnalyticsStore` used in production.
//! - `DbError`: The specific error types that can be returned from this crate.

pub mod analytics_store;
pub mod connection;
pub mod error;
pub mod repository;

pub use analytics_store::PgAnalyticsStore;
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::{DEFAULT_PAGE_LIMIT, ItemRepository, MAX_PAGE_LIMIT};
pub use sqlx::PgPool;
