//! facelog-store: SQLite persistence for the authentication log.
//!
//! Implements [`facelog_core::AttemptStore`] and
//! [`facelog_core::UserRegistry`] on one database file.

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteStore;
