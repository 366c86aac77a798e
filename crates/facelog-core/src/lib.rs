//! facelog-core: Authentication attempt model and statistics engine.
//!
//! Holds the attempt and user types, the period lookup table, summary
//! statistics, time-bucketed breakdowns and the storage traits the daemon
//! is built on. Nothing in here performs I/O.

pub mod breakdown;
pub mod error;
pub mod period;
pub mod stats;
pub mod store;
pub mod types;

pub use breakdown::{compute_breakdown, BreakdownBuilder, BreakdownEntry, Granularity, MAX_BUCKETS};
pub use error::{FaceLogError, Result};
pub use period::Period;
pub use stats::{Stats, StatsAccumulator, UserStats};
pub use store::{AttemptStore, UserRegistry};
pub use types::{
    AttemptFilter, AttemptType, AuthAttempt, AuthAttemptInput, NewUser, Page, Pagination, User,
    UserSummary, Window,
};
