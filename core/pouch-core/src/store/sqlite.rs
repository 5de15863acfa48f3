//! SQLite-backed session store.
//!
//! Safe to open from several processes at once (the CLI foreground timer and
//! the sweep daemon do exactly that). Conditional updates run inside an
//! IMMEDIATE transaction, which takes the database write lock before the row
//! is read, so two writers can never both pass the same precondition.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};

use super::{Precondition, SessionPatch, SessionStore, StoreError};
use crate::types::{NewSession, Session, SessionId};

const BUSY_TIMEOUT_MS: i64 = 5000;

const SESSION_COLUMNS: &str =
    "id, owner, start_time, target_minutes, is_active, paused_at, total_pause_ms, end_time";

pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    owner TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    target_minutes INTEGER NOT NULL,
                    is_active INTEGER NOT NULL,
                    paused_at TEXT,
                    total_pause_ms INTEGER NOT NULL DEFAULT 0,
                    end_time TEXT
                 );
                 CREATE INDEX IF NOT EXISTS idx_sessions_owner_active
                    ON sessions (owner, is_active);
                 COMMIT;",
            )
            .map_err(|err| StoreError::Write(format!("Failed to initialize schema: {}", err)))
        })
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.connect()?;
        op(&mut conn)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| StoreError::Write(format!("Failed to create data dir: {}", err)))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| StoreError::Read(format!("Failed to open sqlite db: {}", err)))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| StoreError::Read(format!("Failed to enable WAL: {}", err)))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| StoreError::Read(format!("Failed to set synchronous: {}", err)))?;
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
            .map_err(|err| StoreError::Read(format!("Failed to set busy_timeout: {}", err)))?;

        Ok(conn)
    }
}

impl SessionStore for SqliteStore {
    fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let session = new.into_session(SessionId::generate());
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sessions \
                    (id, owner, start_time, target_minutes, is_active, paused_at, total_pause_ms, end_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    session.id.as_str(),
                    session.owner,
                    format_timestamp(session.start_time),
                    session.target_minutes,
                    session.is_active,
                    session.paused_at.map(format_timestamp),
                    session.total_pause_duration.num_milliseconds(),
                    session.end_time.map(format_timestamp),
                ],
            )
            .map_err(|err| StoreError::Write(format!("Failed to insert session: {}", err)))?;
            Ok(())
        })?;
        Ok(session)
    }

    fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.with_connection(|conn| {
            query_session(conn, id)
                .map_err(|err| StoreError::Read(format!("Failed to query session: {}", err)))?
                .ok_or_else(|| StoreError::NotFound(id.clone()))
        })
    }

    fn update(
        &self,
        id: &SessionId,
        patch: &SessionPatch,
        condition: &Precondition,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| StoreError::Write(format!("Failed to begin update: {}", err)))?;

            let current = query_session(&tx, id)
                .map_err(|err| StoreError::Write(format!("Failed to read session: {}", err)))?
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            condition.check(&current)?;

            let mut next = current;
            patch.apply(&mut next)?;

            tx.execute(
                "UPDATE sessions SET \
                    paused_at = ?2, \
                    total_pause_ms = ?3, \
                    is_active = ?4, \
                    end_time = ?5 \
                 WHERE id = ?1",
                params![
                    id.as_str(),
                    next.paused_at.map(format_timestamp),
                    next.total_pause_duration.num_milliseconds(),
                    next.is_active,
                    next.end_time.map(format_timestamp),
                ],
            )
            .map_err(|err| StoreError::Write(format!("Failed to update session: {}", err)))?;

            tx.commit()
                .map_err(|err| StoreError::Write(format!("Failed to commit update: {}", err)))
        })
    }

    fn list_active(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions \
                 WHERE owner = ?1 AND is_active = 1 AND end_time IS NULL"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|err| StoreError::Read(format!("Failed to prepare sessions query: {}", err)))?;

            let rows = stmt
                .query_map(params![owner], session_from_row)
                .map_err(|err| StoreError::Read(format!("Failed to query sessions: {}", err)))?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(
                    row.map_err(|err| StoreError::Read(format!("Failed to decode session row: {}", err)))?,
                );
            }
            // Timestamps are variable-width text, so order after parsing.
            sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
            Ok(sessions)
        })
    }
}

fn query_session(conn: &Connection, id: &SessionId) -> rusqlite::Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    conn.query_row(&sql, params![id.as_str()], session_from_row)
        .optional()
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId::from(row.get::<_, String>(0)?),
        owner: row.get(1)?,
        start_time: timestamp_column(row, 2)?,
        target_minutes: row.get(3)?,
        is_active: row.get(4)?,
        paused_at: optional_timestamp_column(row, 5)?,
        total_pause_duration: Duration::milliseconds(row.get(6)?),
        end_time: optional_timestamp_column(row, 7)?,
    })
}

fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(idx, &raw)
}

fn optional_timestamp_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| parse_timestamp(idx, &value)).transpose()
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Invalid timestamp: {}", raw),
                )),
            )
        })
}

// AutoSi keeps sub-second precision, so the exact-instant pause check
// survives a round trip through the database.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
