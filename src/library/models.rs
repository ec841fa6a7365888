//! Library data models: books, access-token records, progress, bookmarks

use crate::user::AccessKind;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Path segment of the book in the external reader.
    pub slug: String,
    pub access: AccessKind,
}

/// One live access token per (user, book) pair. The token is reused until it
/// expires; repeated "Read Book" clicks must not invalidate an open reader
/// session by minting a replacement.
#[derive(Debug, Clone)]
pub struct BookAccessRecord {
    /// `"{user_id}-{book_id}"`, mirrors the purchase id convention.
    pub id: String,
    pub user_id: usize,
    pub book_id: String,
    pub token: String,
    /// Unix seconds; None means the token never expires.
    pub expires_at: Option<u64>,
    pub created: SystemTime,
    pub last_used: SystemTime,
}

impl BookAccessRecord {
    pub fn is_expired(&self, now_epoch: u64) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => expires_at <= now_epoch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub user_id: usize,
    pub book_id: String,
    pub page: u32,
    pub chapter: Option<u32>,
    pub note: Option<String>,
    pub bookmark_type: String,
    pub metadata: Option<serde_json::Value>,
    pub created: SystemTime,
    pub updated: Option<SystemTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub user_id: usize,
    pub book_id: String,
    /// Percent of the book completed, 0-100.
    pub progress: f64,
    pub current_page: u32,
    pub current_chapter: u32,
    /// Cumulative seconds across all syncs; only ever grows.
    pub time_spent: u64,
    pub last_read_at: SystemTime,
}

/// One incremental progress sync from the reader. `time_spent` is a delta,
/// never a total.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressSync {
    pub progress: f64,
    pub current_page: u32,
    pub current_chapter: u32,
    pub time_spent: u64,
}
