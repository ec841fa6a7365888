use super::analytics_store::AnalyticsStore;
use super::models::{ReadingSession, UserAnalytics};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

const USER_ANALYTICS_TABLE_V_1: Table = Table {
    name: "user_analytics",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("document", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[],
};

const READING_SESSION_TABLE_V_1: Table = Table {
    name: "reading_session",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("book_id", &SqlType::Text, non_null = true),
        sqlite_column!("session_start", &SqlType::Integer, non_null = true),
        sqlite_column!("session_end", &SqlType::Integer),
        sqlite_column!("total_duration", &SqlType::Integer, non_null = true),
        sqlite_column!("pages_visited", &SqlType::Text, non_null = true),
        sqlite_column!("interactions_count", &SqlType::Integer, non_null = true),
        sqlite_column!("device_type", &SqlType::Text),
        sqlite_column!("browser_info", &SqlType::Text),
    ],
    unique_constraints: &[],
    indices: &[("idx_reading_session_user_id", "user_id")],
};

pub const ANALYTICS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[USER_ANALYTICS_TABLE_V_1, READING_SESSION_TABLE_V_1],
    migration: None,
}];

fn to_epoch(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn from_epoch(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

/// The aggregate is stored as one JSON document per user: the profile is
/// always read and written whole, and its nested breakdowns would be a dozen
/// sparse columns otherwise.
pub struct SqliteAnalyticsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAnalyticsStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open analytics database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = ANALYTICS_VERSIONED_SCHEMAS.last().unwrap();
        if is_new_db {
            info!("Creating new analytics database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            let schema = ANALYTICS_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown analytics database version {}", db_version))?;
            schema
                .validate(&conn)
                .context("Analytics database schema validation failed")?;
            if schema.version < latest.version {
                bail!(
                    "Analytics database version {} is older than {} and no migration is defined",
                    schema.version,
                    latest.version
                );
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<ReadingSession> {
        let user_id: i64 = row.get("user_id")?;
        let session_start: i64 = row.get("session_start")?;
        let session_end: Option<i64> = row.get("session_end")?;
        let total_duration: i64 = row.get("total_duration")?;
        let interactions_count: i64 = row.get("interactions_count")?;
        let pages_visited: String = row.get("pages_visited")?;

        Ok(ReadingSession {
            id: row.get("id")?,
            user_id: user_id as usize,
            book_id: row.get("book_id")?,
            session_start: from_epoch(session_start),
            session_end: session_end.map(from_epoch),
            total_duration: total_duration.max(0) as u64,
            pages_visited: serde_json::from_str(&pages_visited).unwrap_or_default(),
            interactions_count: interactions_count.max(0) as u64,
            device_type: row.get("device_type")?,
            browser_info: row.get("browser_info")?,
        })
    }
}

impl AnalyticsStore for SqliteAnalyticsStore {
    fn get_user_analytics(&self, user_id: usize) -> Result<Option<UserAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM user_analytics WHERE user_id = ?1",
                params![user_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        match document {
            None => Ok(None),
            Some(document) => Ok(Some(
                serde_json::from_str(&document).context("Corrupt user analytics document")?,
            )),
        }
    }

    fn put_user_analytics(&self, analytics: &UserAnalytics) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let document = serde_json::to_string(analytics)?;
        conn.execute(
            "INSERT INTO user_analytics (user_id, document, updated)
             VALUES (?1, ?2, cast(strftime('%s','now') as int))
             ON CONFLICT (user_id) DO UPDATE SET
                document = excluded.document,
                updated = excluded.updated",
            params![analytics.user_id as i64, document],
        )?;
        Ok(())
    }

    fn delete_user_analytics(&self, user_id: usize) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM user_analytics WHERE user_id = ?1",
            params![user_id as i64],
        )?;
        Ok(deleted > 0)
    }

    fn create_session(&self, session: &ReadingSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reading_session
                (id, user_id, book_id, session_start, session_end, total_duration,
                 pages_visited, interactions_count, device_type, browser_info)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.id,
                session.user_id as i64,
                session.book_id,
                to_epoch(session.session_start),
                session.session_end.map(to_epoch),
                session.total_duration as i64,
                serde_json::to_string(&session.pages_visited)?,
                session.interactions_count as i64,
                session.device_type,
                session.browser_info,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<ReadingSession>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT id, user_id, book_id, session_start, session_end, total_duration,
                        pages_visited, interactions_count, device_type, browser_info
                 FROM reading_session WHERE id = ?1",
                params![session_id],
                Self::row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn get_active_session(
        &self,
        user_id: usize,
        book_id: &str,
    ) -> Result<Option<ReadingSession>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT id, user_id, book_id, session_start, session_end, total_duration,
                        pages_visited, interactions_count, device_type, browser_info
                 FROM reading_session
                 WHERE user_id = ?1 AND book_id = ?2 AND session_end IS NULL
                 ORDER BY session_start DESC LIMIT 1",
                params![user_id as i64, book_id],
                Self::row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    fn update_session(&self, session: &ReadingSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE reading_session SET
                session_end = ?1, total_duration = ?2, pages_visited = ?3,
                interactions_count = ?4
             WHERE id = ?5",
            params![
                session.session_end.map(to_epoch),
                session.total_duration as i64,
                serde_json::to_string(&session.pages_visited)?,
                session.interactions_count as i64,
                session.id,
            ],
        )?;
        if updated == 0 {
            bail!("Reading session {} does not exist", session.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteAnalyticsStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteAnalyticsStore::new(dir.path().join("analytics.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn analytics_document_roundtrip() {
        let (_dir, store) = make_store();

        assert!(store.get_user_analytics(1).unwrap().is_none());

        let mut analytics = UserAnalytics::new(1);
        analytics.pages_read = 5;
        store.put_user_analytics(&analytics).unwrap();

        let fetched = store.get_user_analytics(1).unwrap().unwrap();
        assert_eq!(fetched.pages_read, 5);

        analytics.pages_read = 6;
        store.put_user_analytics(&analytics).unwrap();
        let fetched = store.get_user_analytics(1).unwrap().unwrap();
        assert_eq!(fetched.pages_read, 6);

        assert!(store.delete_user_analytics(1).unwrap());
        assert!(store.get_user_analytics(1).unwrap().is_none());
    }

    #[test]
    fn active_session_lookup_ignores_ended_sessions() {
        let (_dir, store) = make_store();

        let mut session = ReadingSession {
            id: "s1".to_string(),
            user_id: 1,
            book_id: "wtbtg".to_string(),
            session_start: SystemTime::now(),
            session_end: None,
            total_duration: 0,
            pages_visited: vec![],
            interactions_count: 0,
            device_type: Some("tablet".to_string()),
            browser_info: None,
        };
        store.create_session(&session).unwrap();

        let active = store.get_active_session(1, "wtbtg").unwrap().unwrap();
        assert_eq!(active.id, "s1");
        assert!(store.get_active_session(2, "wtbtg").unwrap().is_none());

        session.session_end = Some(SystemTime::now());
        session.total_duration = 120;
        session.pages_visited = vec![1, 2, 3];
        store.update_session(&session).unwrap();

        assert!(store.get_active_session(1, "wtbtg").unwrap().is_none());
        let ended = store.get_session("s1").unwrap().unwrap();
        assert_eq!(ended.total_duration, 120);
        assert_eq!(ended.pages_visited, vec![1, 2, 3]);
        assert!(!ended.is_active());
    }
}
