use crate::errors::{AppError, AppResult};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, Result};
use tracing::info;

/// A schema step, applied once and recorded in `log` as `migration_applied`.
struct Migration {
    version: &'static str,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "20260301_0001_create_stores",
        description: "Created stores table",
        sql: r#"
        CREATE TABLE IF NOT EXISTS stores (
            id          TEXT NOT NULL,
            tenant_id   TEXT NOT NULL,
            name        TEXT NOT NULL,
            address     TEXT NOT NULL DEFAULT '',
            latitude    REAL NOT NULL CHECK(latitude BETWEEN -90 AND 90),
            longitude   REAL NOT NULL CHECK(longitude BETWEEN -180 AND 180),
            created_at  TEXT NOT NULL,
            PRIMARY KEY (tenant_id, id)
        );
        "#,
    },
    Migration {
        version: "20260301_0002_create_sessions",
        description: "Created sessions table",
        sql: r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            store_id         TEXT NOT NULL,
            tracking_method  TEXT NOT NULL
                CHECK(tracking_method IN ('gps','nfc','qr','badge','web','smart')),
            clock_in_at      TEXT NOT NULL,
            clock_out_at     TEXT,
            latitude         REAL,
            longitude        REAL,
            accuracy_m       REAL,
            address          TEXT,
            evidence         TEXT,
            device_info      TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL,
            CHECK(clock_out_at IS NULL OR clock_out_at > clock_in_at)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user_clock_in
            ON sessions(user_id, clock_in_at);
        "#,
    },
    Migration {
        version: "20260301_0003_one_open_session_per_user",
        description: "Enforced a single open session per user",
        sql: r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
            ON sessions(user_id) WHERE clock_out_at IS NULL;
        "#,
    },
    Migration {
        version: "20260302_0004_create_breaks",
        description: "Created breaks table",
        sql: r#"
        CREATE TABLE IF NOT EXISTS breaks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            start_at    TEXT NOT NULL,
            end_at      TEXT,
            CHECK(end_at IS NULL OR end_at > start_at)
        );

        CREATE INDEX IF NOT EXISTS idx_breaks_session ON breaks(session_id, start_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_breaks_one_open
            ON breaks(session_id) WHERE end_at IS NULL;
        "#,
    },
];

/// Ensure that the `log` table exists.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

fn apply(conn: &Connection, m: &Migration) -> AppResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(m.sql)
        .map_err(|e| AppError::Migration(format!("{}: {}", m.version, e)))?;
    tx.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (?1, 'migration_applied', ?2, ?3)",
        rusqlite::params![Local::now().to_rfc3339(), m.version, m.description],
    )?;
    tx.commit()?;

    info!(version = m.version, "migration applied");
    Ok(())
}

/// Public entry point: run all pending migrations, in order.
///
/// Returns the versions applied by this call.
pub fn run_pending_migrations(conn: &Connection) -> AppResult<Vec<&'static str>> {
    ensure_log_table(conn)?;

    let mut applied = Vec::new();
    for m in MIGRATIONS {
        if is_applied(conn, m.version)? {
            continue;
        }
        apply(conn, m)?;
        applied.push(m.version);
    }
    Ok(applied)
}

pub fn latest_version() -> &'static str {
    MIGRATIONS.last().map_or("", |m| m.version)
}
