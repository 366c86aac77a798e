//! Database schema and migrations, tracked with `PRAGMA user_version`.

use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    email        TEXT NOT NULL UNIQUE,
    created_at   INTEGER NOT NULL,
    last_login   INTEGER,
    login_count  INTEGER NOT NULL DEFAULT 0 CHECK (login_count >= 0),
    is_active    INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_users_login_count ON users (login_count DESC);

-- No foreign key on user_id: attempts outlive the users they reference.
CREATE TABLE IF NOT EXISTS auth_attempts (
    id            TEXT PRIMARY KEY,
    user_id       TEXT,
    success       INTEGER NOT NULL,
    confidence    REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    timestamp_ms  INTEGER NOT NULL,
    ip_address    TEXT,
    user_agent    TEXT,
    attempt_type  TEXT NOT NULL DEFAULT 'face_recognition'
);
CREATE INDEX IF NOT EXISTS idx_attempts_timestamp ON auth_attempts (timestamp_ms DESC);
CREATE INDEX IF NOT EXISTS idx_attempts_success ON auth_attempts (success);
CREATE INDEX IF NOT EXISTS idx_attempts_user_time ON auth_attempts (user_id, timestamp_ms DESC);
";

/// Bring the schema up to [`SCHEMA_VERSION`]. Idempotent.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    tracing::info!(from = version, to = SCHEMA_VERSION, "database schema migrated");
    Ok(())
}
