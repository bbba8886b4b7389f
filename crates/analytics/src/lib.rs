//! # Analytics Engine
//!
//! This crate computes distributional statistics over the ledger's income and
//! expense items for a bounded time window.
//!
//! ## Architectural Principles
//!
//! - **Validate, then query:** A `DateRange` can only be built through range
//!   validation, so the engine never sees a missing, inverted or oversized window.
//! - **One snapshot per call:** Both aggregates and the detail rows are read
//!   through a single `AnalyticsSnapshot`, so they always agree with each other.
//! - **Storage behind a trait:** The engine depends on the `AnalyticsStore`
//!   capability, implemented for PostgreSQL by the `database` crate and in
//!   memory by [`memory::MemoryStore`].
//!
//! ## Public API
//!
//! - `AnalyticsService`: The stateless engine (`get_analytics`, `get_analytics_until`).
//! - `DateRange`: The validated query window.
//! - `AnalyticsStore` / `AnalyticsSnapshot`: The storage capability.
//! - `RetryPolicy`: Bounded retry for transient storage failures.
//! - `AnalyticsError` / `StoreError`: The error types of this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod memory;
pub mod quantile;
pub mod range;
pub mod retry;
pub mod service;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use error::{AnalyticsError, BoxError, ErrorCategory, StoreError};
pub use range::DateRange;
pub use retry::{RetryPolicy, Retryable};
pub use service::AnalyticsService;
pub use store::{AnalyticsSnapshot, AnalyticsStore};
