use super::library_store::{AccessTokenStore, BookStore, ProgressStore};
use super::models::{Book, BookAccessRecord, Bookmark, Progress, ProgressSync};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
use crate::user::AccessKind;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

const BOOK_TABLE_V_1: Table = Table {
    name: "book",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("slug", &SqlType::Text, non_null = true),
        sqlite_column!("access", &SqlType::Text, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[],
};

const BOOK_ACCESS_TOKEN_TABLE_V_1: Table = Table {
    name: "book_access_token",
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
        sqlite_column!("token", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["user_id", "book_id"]],
    indices: &[("idx_book_access_token_user_id", "user_id")],
};

const READING_PROGRESS_TABLE_V_1: Table = Table {
    name: "reading_progress",
    columns: &[
        sqlite_column!("user_id", &SqlType::Integer, non_null = true),
        sqlite_column!("book_id", &SqlType::Text, non_null = true),
        sqlite_column!("progress", &SqlType::Real, non_null = true),
        sqlite_column!("current_page", &SqlType::Integer, non_null = true),
        sqlite_column!("current_chapter", &SqlType::Integer, non_null = true),
        sqlite_column!("time_spent", &SqlType::Integer, non_null = true),
        sqlite_column!("last_read_at", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["user_id", "book_id"]],
    indices: &[("idx_reading_progress_user_id", "user_id")],
};

const BOOKMARK_TABLE_V_1: Table = Table {
    name: "bookmark",
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
        sqlite_column!("page", &SqlType::Integer, non_null = true),
        sqlite_column!("chapter", &SqlType::Integer),
        sqlite_column!("note", &SqlType::Text),
        sqlite_column!("bookmark_type", &SqlType::Text, non_null = true),
        sqlite_column!("metadata", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[("idx_bookmark_user_id", "user_id")],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        BOOK_TABLE_V_1,
        BOOK_ACCESS_TOKEN_TABLE_V_1,
        READING_PROGRESS_TABLE_V_1,
        BOOKMARK_TABLE_V_1,
    ],
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

pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open library database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = LIBRARY_VERSIONED_SCHEMAS.last().unwrap();
        if is_new_db {
            info!("Creating new library database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            let schema = LIBRARY_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown library database version {}", db_version))?;
            schema
                .validate(&conn)
                .context("Library database schema validation failed")?;
            if schema.version < latest.version {
                bail!(
                    "Library database version {} is older than {} and no migration is defined",
                    schema.version,
                    latest.version
                );
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        let access: String = row.get("access")?;
        Ok(Book {
            id: row.get("id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            access: AccessKind::from_str(&access).unwrap_or(AccessKind::Purchased),
        })
    }

    fn row_to_access_record(row: &rusqlite::Row) -> rusqlite::Result<BookAccessRecord> {
        let user_id: i64 = row.get("user_id")?;
        let expires_at: Option<i64> = row.get("expires_at")?;
        let created: i64 = row.get("created")?;
        let last_used: i64 = row.get("last_used")?;
        Ok(BookAccessRecord {
            id: row.get("id")?,
            user_id: user_id as usize,
            book_id: row.get("book_id")?,
            token: row.get("token")?,
            expires_at: expires_at.map(|v| v.max(0) as u64),
            created: from_epoch(created),
            last_used: from_epoch(last_used),
        })
    }

    fn row_to_progress(row: &rusqlite::Row) -> rusqlite::Result<Progress> {
        let user_id: i64 = row.get("user_id")?;
        let time_spent: i64 = row.get("time_spent")?;
        let last_read_at: i64 = row.get("last_read_at")?;
        let current_page: i64 = row.get("current_page")?;
        let current_chapter: i64 = row.get("current_chapter")?;
        Ok(Progress {
            user_id: user_id as usize,
            book_id: row.get("book_id")?,
            progress: row.get("progress")?,
            current_page: current_page.max(0) as u32,
            current_chapter: current_chapter.max(0) as u32,
            time_spent: time_spent.max(0) as u64,
            last_read_at: from_epoch(last_read_at),
        })
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let user_id: i64 = row.get("user_id")?;
        let page: i64 = row.get("page")?;
        let chapter: Option<i64> = row.get("chapter")?;
        let metadata: Option<String> = row.get("metadata")?;
        let created: i64 = row.get("created")?;
        let updated: Option<i64> = row.get("updated")?;
        Ok(Bookmark {
            id: row.get("id")?,
            user_id: user_id as usize,
            book_id: row.get("book_id")?,
            page: page.max(0) as u32,
            chapter: chapter.map(|c| c.max(0) as u32),
            note: row.get("note")?,
            bookmark_type: row.get("bookmark_type")?,
            metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
            created: from_epoch(created),
            updated: updated.map(from_epoch),
        })
    }

    fn insert_bookmark_row(conn: &Connection, bookmark: &Bookmark) -> Result<()> {
        let metadata = bookmark
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m))
            .transpose()?;
        conn.execute(
            "INSERT INTO bookmark
                (id, user_id, book_id, page, chapter, note, bookmark_type, metadata, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                bookmark.id,
                bookmark.user_id as i64,
                bookmark.book_id,
                bookmark.page as i64,
                bookmark.chapter.map(|c| c as i64),
                bookmark.note,
                bookmark.bookmark_type,
                metadata,
                to_epoch(bookmark.created),
                bookmark.updated.map(to_epoch),
            ],
        )?;
        Ok(())
    }
}

impl BookStore for SqliteLibraryStore {
    fn get_book(&self, book_id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock().unwrap();
        let book = conn
            .query_row(
                "SELECT id, title, slug, access FROM book WHERE id = ?1",
                params![book_id],
                Self::row_to_book,
            )
            .optional()?;
        Ok(book)
    }

    fn upsert_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO book (id, title, slug, access) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                slug = excluded.slug,
                access = excluded.access",
            params![book.id, book.title, book.slug, book.access.as_str()],
        )?;
        Ok(())
    }

    fn get_all_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, title, slug, access FROM book ORDER BY id")?;
        let books = stmt
            .query_map([], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(books)
    }
}

impl AccessTokenStore for SqliteLibraryStore {
    fn get_access_record(
        &self,
        user_id: usize,
        book_id: &str,
    ) -> Result<Option<BookAccessRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, user_id, book_id, token, expires_at, created, last_used
                 FROM book_access_token WHERE user_id = ?1 AND book_id = ?2",
                params![user_id as i64, book_id],
                Self::row_to_access_record,
            )
            .optional()?;
        Ok(record)
    }

    fn put_access_record(&self, record: &BookAccessRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO book_access_token
                (id, user_id, book_id, token, expires_at, created, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                token = excluded.token,
                expires_at = excluded.expires_at,
                created = excluded.created,
                last_used = excluded.last_used",
            params![
                record.id,
                record.user_id as i64,
                record.book_id,
                record.token,
                record.expires_at.map(|v| v as i64),
                to_epoch(record.created),
                to_epoch(record.last_used),
            ],
        )?;
        Ok(())
    }

    fn touch_access_record(&self, user_id: usize, book_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE book_access_token
             SET last_used = cast(strftime('%s','now') as int)
             WHERE user_id = ?1 AND book_id = ?2",
            params![user_id as i64, book_id],
        )?;
        Ok(())
    }

    fn prune_expired_access_records(&self, now_epoch: u64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM book_access_token
             WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now_epoch as i64],
        )?;
        Ok(deleted)
    }
}

impl ProgressStore for SqliteLibraryStore {
    fn get_progress(&self, user_id: usize, book_id: &str) -> Result<Option<Progress>> {
        let conn = self.conn.lock().unwrap();
        let progress = conn
            .query_row(
                "SELECT user_id, book_id, progress, current_page, current_chapter,
                        time_spent, last_read_at
                 FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
                params![user_id as i64, book_id],
                Self::row_to_progress,
            )
            .optional()?;
        Ok(progress)
    }

    fn apply_progress_sync(
        &self,
        user_id: usize,
        book_id: &str,
        sync: &ProgressSync,
    ) -> Result<Progress> {
        let conn = self.conn.lock().unwrap();
        let now = to_epoch(SystemTime::now());
        // The upsert adds the delta to the stored total in one statement, so
        // concurrent syncs for the same pair cannot lose time.
        conn.execute(
            "INSERT INTO reading_progress
                (user_id, book_id, progress, current_page, current_chapter, time_spent, last_read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                progress = excluded.progress,
                current_page = excluded.current_page,
                current_chapter = excluded.current_chapter,
                time_spent = reading_progress.time_spent + excluded.time_spent,
                last_read_at = excluded.last_read_at",
            params![
                user_id as i64,
                book_id,
                sync.progress,
                sync.current_page as i64,
                sync.current_chapter as i64,
                sync.time_spent as i64,
                now,
            ],
        )?;

        let progress = conn.query_row(
            "SELECT user_id, book_id, progress, current_page, current_chapter,
                    time_spent, last_read_at
             FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
            params![user_id as i64, book_id],
            Self::row_to_progress,
        )?;
        Ok(progress)
    }

    fn get_bookmarks(&self, user_id: usize, book_id: &str) -> Result<Vec<Bookmark>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, book_id, page, chapter, note, bookmark_type, metadata,
                    created, updated
             FROM bookmark WHERE user_id = ?1 AND book_id = ?2 ORDER BY page",
        )?;
        let bookmarks = stmt
            .query_map(params![user_id as i64, book_id], Self::row_to_bookmark)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bookmarks)
    }

    fn replace_bookmarks(
        &self,
        user_id: usize,
        book_id: &str,
        bookmarks: &[Bookmark],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM bookmark WHERE user_id = ?1 AND book_id = ?2",
            params![user_id as i64, book_id],
        )?;
        for bookmark in bookmarks {
            Self::insert_bookmark_row(&tx, bookmark)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::insert_bookmark_row(&conn, bookmark)
    }

    fn get_bookmark(&self, bookmark_id: &str) -> Result<Option<Bookmark>> {
        let conn = self.conn.lock().unwrap();
        let bookmark = conn
            .query_row(
                "SELECT id, user_id, book_id, page, chapter, note, bookmark_type, metadata,
                        created, updated
                 FROM bookmark WHERE id = ?1",
                params![bookmark_id],
                Self::row_to_bookmark,
            )
            .optional()?;
        Ok(bookmark)
    }

    fn update_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let metadata = bookmark
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m))
            .transpose()?;
        let updated = conn.execute(
            "UPDATE bookmark SET
                page = ?1, chapter = ?2, note = ?3, bookmark_type = ?4, metadata = ?5, updated = ?6
             WHERE id = ?7",
            params![
                bookmark.page as i64,
                bookmark.chapter.map(|c| c as i64),
                bookmark.note,
                bookmark.bookmark_type,
                metadata,
                bookmark.updated.map(to_epoch),
                bookmark.id,
            ],
        )?;
        if updated == 0 {
            bail!("Bookmark {} does not exist", bookmark.id);
        }
        Ok(())
    }

    fn delete_bookmark(&self, bookmark_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM bookmark WHERE id = ?1", params![bookmark_id])?;
        if deleted == 0 {
            bail!("Bookmark {} does not exist", bookmark_id);
        }
        Ok(())
    }
}
