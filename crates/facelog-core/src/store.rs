//! Storage seams used by the aggregation engine.
//!
//! Both traits are object safe so a service can hold `Arc<dyn ...>` and tests
//! can swap the backend.

use crate::breakdown::{BreakdownEntry, Granularity};
use crate::error::Result;
use crate::stats::StatsAccumulator;
use crate::types::{AttemptFilter, AuthAttempt, NewUser, Page, Pagination, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Append-only log of authentication attempts.
///
/// Aggregates are folded row by row inside the store; only [`page`]
/// hands attempts back to the caller.
///
/// [`page`]: AttemptStore::page
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Durably persist `attempt`. Returns only once the write is confirmed.
    async fn append(&self, attempt: &AuthAttempt) -> Result<()>;

    /// Persist `attempt` and, when it is a success attributed to a user,
    /// credit that user's login counter at `at`, all in one transaction.
    ///
    /// Either both writes land or neither does. Returns whether a user was
    /// credited; an unknown user leaves the attempt recorded and returns
    /// `false`.
    async fn append_crediting(&self, attempt: &AuthAttempt, at: DateTime<Utc>) -> Result<bool>;

    /// One page of matching attempts, most recent first, with the total
    /// number of matches.
    async fn page(&self, filter: &AttemptFilter, pagination: Pagination) -> Result<Page<AuthAttempt>>;

    /// Fold every matching attempt into a [`StatsAccumulator`].
    async fn fold_stats(&self, filter: &AttemptFilter) -> Result<StatsAccumulator>;

    /// Bucket every matching attempt at `granularity`.
    async fn fold_breakdown(
        &self,
        filter: &AttemptFilter,
        granularity: Granularity,
    ) -> Result<Vec<BreakdownEntry>>;
}

/// Enrolled users and their login counters.
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Atomically bump `login_count` and move `last_login` forward to `at`.
    ///
    /// Returns `false` when no such user exists.
    async fn increment_login_count(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn count_active(&self) -> Result<u64>;

    async fn count_all(&self) -> Result<u64>;

    /// Active users ordered by `login_count` descending.
    async fn top_by_login_count(&self, n: usize) -> Result<Vec<User>>;

    /// Register a new active user. Duplicate emails are a validation error.
    async fn register(&self, user: NewUser) -> Result<User>;

    /// Returns `false` when no such user exists.
    async fn set_active(&self, id: &str, active: bool) -> Result<bool>;

    /// Delete the user record. Attempts that reference it are kept.
    async fn remove(&self, id: &str) -> Result<bool>;
}
