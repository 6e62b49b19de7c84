//! Event store
//!
//! One append-mostly SQLite collection. The unique primary key on
//! `event_id` is the sole idempotency guard: concurrent requests need no
//! other coordination, and a conflicting insert is reported as a duplicate
//! rather than an error. Records are immutable after insert.
//!
//! Uses embedded migrations managed via PRAGMA user_version.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use beacon_core::envelope::{Envelope, EventContext};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: events collection with idempotency and range-scan indexes
    r#"
    CREATE TABLE IF NOT EXISTS events (
        event_id        TEXT PRIMARY KEY,
        schema_version  INTEGER NOT NULL,
        name            TEXT NOT NULL,
        client_ts       DATETIME NOT NULL,
        received_at     DATETIME NOT NULL,
        anonymous_id    TEXT NOT NULL,
        user_id         TEXT,
        session_id      TEXT NOT NULL,
        platform        TEXT NOT NULL,
        app_name        TEXT NOT NULL,
        app_version     TEXT NOT NULL,
        build           TEXT NOT NULL,
        environment     TEXT NOT NULL,
        context         JSON NOT NULL,
        properties      JSON NOT NULL,
        ip_hash         TEXT,
        client_summary  TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_events_client_ts ON events(client_ts DESC);
    CREATE INDEX IF NOT EXISTS idx_events_user_ts ON events(user_id, client_ts);
    CREATE INDEX IF NOT EXISTS idx_events_anonymous_ts ON events(anonymous_id, client_ts);
    "#,
];

/// Result of one idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Newly stored
    Inserted,
    /// An event with this id already exists; nothing was written
    Duplicate,
}

/// Database handle for the events collection
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        // Bound how long a slow writer can block a request
        conn.busy_timeout(Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run all pending migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let current_version: i32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap_or(0);

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                tracing::info!(version, "Running migration");
                conn.execute_batch(migration)?;
                conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
            }
        }

        Ok(())
    }

    /// Insert one enriched envelope, keyed by its event id.
    ///
    /// A uniqueness conflict leaves the existing record untouched and is
    /// reported as [`InsertOutcome::Duplicate`].
    pub fn insert_event(&self, envelope: &Envelope) -> Result<InsertOutcome> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            INSERT INTO events (
                event_id, schema_version, name, client_ts, received_at,
                anonymous_id, user_id, session_id, platform,
                app_name, app_version, build, environment,
                context, properties, ip_hash, client_summary
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(event_id) DO NOTHING
            "#,
            params![
                envelope.event_id,
                envelope.schema_version,
                envelope.name,
                envelope.client_ts,
                envelope.received_at,
                envelope.anonymous_id,
                envelope.user_id,
                envelope.session_id,
                envelope.platform.as_str(),
                envelope.app_name,
                envelope.app_version,
                envelope.build,
                envelope.environment.as_str(),
                serde_json::to_string(&envelope.context)?,
                serde_json::to_string(&envelope.properties)?,
                envelope.ip_hash,
                envelope.client_summary,
            ],
        )?;

        if changed == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Most recent events by client timestamp, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<Envelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM events ORDER BY client_ts DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_envelope)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Time-ranged scan for one authenticated user, oldest first
    pub fn by_user(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Envelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM events
             WHERE user_id = ?1 AND client_ts >= ?2 AND client_ts <= ?3
             ORDER BY client_ts ASC",
        )?;
        let rows = stmt.query_map(params![user_id, from, to], row_to_envelope)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Time-ranged scan for one anonymous install, oldest first
    pub fn by_anonymous(
        &self,
        anonymous_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Envelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM events
             WHERE anonymous_id = ?1 AND client_ts >= ?2 AND client_ts <= ?3
             ORDER BY client_ts ASC",
        )?;
        let rows = stmt.query_map(params![anonymous_id, from, to], row_to_envelope)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Total stored events
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Cheap liveness probe for the health endpoint
    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

/// Map one row back into an envelope
fn row_to_envelope(row: &Row<'_>) -> rusqlite::Result<Envelope> {
    let platform: String = row.get("platform")?;
    let environment: String = row.get("environment")?;
    let context: String = row.get("context")?;
    let properties: String = row.get("properties")?;

    Ok(Envelope {
        event_id: row.get("event_id")?,
        schema_version: row.get("schema_version")?,
        name: row.get("name")?,
        client_ts: row.get("client_ts")?,
        received_at: row.get("received_at")?,
        anonymous_id: row.get("anonymous_id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        platform: platform.parse().map_err(|e: String| text_error(8, e))?,
        environment: environment.parse().map_err(|e: String| text_error(12, e))?,
        app_name: row.get("app_name")?,
        app_version: row.get("app_version")?,
        build: row.get("build")?,
        context: serde_json::from_str::<EventContext>(&context)
            .map_err(|e| text_error(13, e.to_string()))?,
        properties: serde_json::from_str(&properties)
            .map_err(|e| text_error(14, e.to_string()))?,
        ip_hash: row.get("ip_hash")?,
        client_summary: row.get("client_summary")?,
    })
}

fn text_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
