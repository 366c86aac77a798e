//! SQLite-backed attempt log and user registry.
//!
//! The connection lives on a dedicated `tokio-rusqlite` worker thread, so
//! every statement is serialized there. Counter updates are a single
//! `UPDATE` and never read the old value back into Rust.

use crate::error::{storage, StoreError};
use crate::schema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use facelog_core::{
    AttemptFilter, AttemptStore, AuthAttempt, BreakdownBuilder, BreakdownEntry, FaceLogError,
    Granularity, NewUser, Page, Pagination, Result, StatsAccumulator, User, UserRegistry,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use tokio_rusqlite::Connection;

const ATTEMPT_COLUMNS: &str =
    "id, user_id, success, confidence, timestamp_ms, ip_address, user_agent, attempt_type";
const USER_COLUMNS: &str = "id, name, email, created_at, last_login, login_count, is_active";

/// Clone-safe handle to the SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> std::result::Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.clone()).await?;
        tracing::info!(path = %path.display(), "database opened");
        Self::init(conn).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn open_in_memory() -> std::result::Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> std::result::Result<Self, StoreError> {
        conn.call(|conn| Ok(schema::migrate(conn)?)).await?;
        Ok(Self { conn })
    }

    /// Close the connection, waiting for queued statements to finish.
    pub async fn close(self) -> std::result::Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for SqliteStore {
    async fn append(&self, attempt: &AuthAttempt) -> Result<()> {
        let a = attempt.clone();
        self.conn
            .call(move |conn| {
                insert_attempt(conn, &a)?;
                Ok(())
            })
            .await
            .map_err(storage)
    }

    async fn append_crediting(&self, attempt: &AuthAttempt, at: DateTime<Utc>) -> Result<bool> {
        let a = attempt.clone();
        let at_ms = at.timestamp_millis();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                insert_attempt(&tx, &a)?;
                let credited = match (&a.user_id, a.success) {
                    (Some(user_id), true) => credit_login(&tx, user_id, at_ms)?,
                    _ => false,
                };
                tx.commit()?;
                Ok(credited)
            })
            .await
            .map_err(storage)
    }

    async fn page(&self, filter: &AttemptFilter, pagination: Pagination) -> Result<Page<AuthAttempt>> {
        let (where_sql, mut values) = where_clause(filter);
        self.conn
            .call(move |conn| {
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM auth_attempts{where_sql}"),
                    rusqlite::params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;

                values.push(Value::Integer(i64::from(pagination.per_page)));
                values.push(Value::Integer(
                    i64::try_from(pagination.offset()).unwrap_or(i64::MAX),
                ));
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM auth_attempts{where_sql} \
                     ORDER BY timestamp_ms DESC, rowid DESC LIMIT ? OFFSET ?"
                ))?;
                let items = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), attempt_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(Page::new(items, pagination, total.max(0) as u64))
            })
            .await
            .map_err(storage)
    }

    async fn fold_stats(&self, filter: &AttemptFilter) -> Result<StatsAccumulator> {
        let (where_sql, values) = where_clause(filter);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT success, confidence, timestamp_ms FROM auth_attempts{where_sql}"
                ))?;
                let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
                let mut acc = StatsAccumulator::default();
                while let Some(row) = rows.next()? {
                    acc.add(row.get(0)?, row.get(1)?, millis_to_utc(2, row.get(2)?)?);
                }
                Ok(acc)
            })
            .await
            .map_err(storage)
    }

    async fn fold_breakdown(
        &self,
        filter: &AttemptFilter,
        granularity: Granularity,
    ) -> Result<Vec<BreakdownEntry>> {
        let (where_sql, values) = where_clause(filter);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT timestamp_ms, success FROM auth_attempts{where_sql}"
                ))?;
                let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
                let mut builder = BreakdownBuilder::new(granularity);
                while let Some(row) = rows.next()? {
                    builder.add(millis_to_utc(0, row.get(0)?)?, row.get(1)?);
                }
                Ok(builder.finish())
            })
            .await
            .map_err(storage)
    }
}

#[async_trait]
impl UserRegistry for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await
            .map_err(storage)
    }

    async fn increment_login_count(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();
        let at_ms = at.timestamp_millis();
        self.conn
            .call(move |conn| Ok(credit_login(conn, &id, at_ms)?))
            .await
            .map_err(storage)
    }

    async fn count_active(&self) -> Result<u64> {
        self.count_users("SELECT COUNT(*) FROM users WHERE is_active = 1").await
    }

    async fn count_all(&self) -> Result<u64> {
        self.count_users("SELECT COUNT(*) FROM users").await
    }

    async fn top_by_login_count(&self, n: usize) -> Result<Vec<User>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1 \
                     ORDER BY login_count DESC, last_login DESC LIMIT ?1"
                ))?;
                let users = stmt
                    .query_map(params![limit], user_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(users)
            })
            .await
            .map_err(storage)
    }

    async fn register(&self, user: NewUser) -> Result<User> {
        let NewUser { name, email } = user.normalized()?;
        let created = User {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            created_at: now_millis(),
            last_login: None,
            login_count: 0,
            is_active: true,
        };

        let row = created.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (id, name, email, created_at, login_count, is_active) \
                     VALUES (?1, ?2, ?3, ?4, 0, 1)",
                    params![row.id, row.name, row.email, row.created_at.timestamp_millis()],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(storage)?;

        if !inserted {
            return Err(FaceLogError::Validation(format!(
                "user with email {} already exists",
                created.email
            )));
        }
        tracing::info!(user_id = %created.id, "user registered");
        Ok(created)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE users SET is_active = ?2 WHERE id = ?1",
                    params![id, active],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage)
    }
}

impl SqliteStore {
    async fn count_users(&self, sql: &'static str) -> Result<u64> {
        self.conn
            .call(move |conn| {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n.max(0) as u64)
            })
            .await
            .map_err(storage)
    }
}

fn insert_attempt(conn: &rusqlite::Connection, a: &AuthAttempt) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO auth_attempts ({ATTEMPT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            a.id,
            a.user_id,
            a.success,
            a.confidence,
            a.timestamp.timestamp_millis(),
            a.ip_address,
            a.user_agent,
            a.attempt_type.as_str(),
        ],
    )?;
    Ok(())
}

/// Bump the counter in one statement; `last_login` only moves forward.
fn credit_login(conn: &rusqlite::Connection, id: &str, at_ms: i64) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE users \
         SET login_count = login_count + 1, \
             last_login = MAX(COALESCE(last_login, ?2), ?2) \
         WHERE id = ?1",
        params![id, at_ms],
    )?;
    Ok(changed > 0)
}

/// Translate a filter into a ` WHERE ...` suffix and its positional values.
fn where_clause(filter: &AttemptFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(success) = filter.success {
        clauses.push("success = ?");
        values.push(Value::Integer(i64::from(success)));
    }
    if let Some(user_id) = &filter.user_id {
        clauses.push("user_id = ?");
        values.push(Value::Text(user_id.clone()));
    }
    if let Some(from) = filter.from {
        clauses.push("timestamp_ms >= ?");
        values.push(Value::Integer(from.timestamp_millis()));
    }
    if let Some(to) = filter.to {
        clauses.push("timestamp_ms <= ?");
        values.push(Value::Integer(to.timestamp_millis()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AuthAttempt> {
    let attempt_type: String = row.get(7)?;
    let attempt_type = attempt_type
        .parse()
        .map_err(|e: FaceLogError| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(AuthAttempt {
        id: row.get(0)?,
        user_id: row.get(1)?,
        success: row.get(2)?,
        confidence: row.get(3)?,
        timestamp: millis_to_utc(4, row.get(4)?)?,
        ip_address: row.get(5)?,
        user_agent: row.get(6)?,
        attempt_type,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let last_login = match row.get::<_, Option<i64>>(4)? {
        Some(ms) => Some(millis_to_utc(4, ms)?),
        None => None,
    };
    let login_count: i64 = row.get(5)?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: millis_to_utc(3, row.get(3)?)?,
        last_login,
        login_count: login_count.max(0) as u64,
        is_active: row.get(6)?,
    })
}

fn millis_to_utc(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, ms))
}

fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
