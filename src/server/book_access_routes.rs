//! Endpoints exchanged with the externally hosted book reader.
//!
//! `generate-token` is called by the platform UI with a session token; the
//! validate/update endpoints are called back by the reader itself, which
//! holds only the book access token.

use super::auth_routes::PublicUser;
use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;
use crate::book_access::BookPermission;
use crate::library::{Bookmark, Progress, ProgressStore, ProgressSync};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
struct GenerateTokenBody {
    pub book_id: String,
}

#[derive(Deserialize, Debug)]
struct ValidateBody {
    pub token: String,
    pub book_id: String,
}

/// Bookmark entry as submitted by the reader. Only entries carrying a
/// numeric page are considered well-formed; the rest are dropped.
#[derive(Deserialize, Debug)]
struct BookmarkEntry {
    pub id: Option<String>,
    pub page: Option<u32>,
    pub chapter: Option<u32>,
    pub note: Option<String>,
    pub bookmark_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct UpdateProgressBody {
    pub token: String,
    pub book_id: String,
    pub progress: f64,
    pub current_page: u32,
    pub current_chapter: u32,
    /// Incremental seconds since the previous sync, never a total.
    pub time_spent: u64,
    pub bookmarks: Option<Vec<BookmarkEntry>>,
}

fn epoch(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[derive(Serialize)]
pub(crate) struct ProgressView {
    pub book_id: String,
    pub progress: f64,
    pub current_page: u32,
    pub current_chapter: u32,
    pub time_spent: u64,
    pub last_read_at: u64,
}

impl From<&Progress> for ProgressView {
    fn from(progress: &Progress) -> Self {
        Self {
            book_id: progress.book_id.clone(),
            progress: progress.progress,
            current_page: progress.current_page,
            current_chapter: progress.current_chapter,
            time_spent: progress.time_spent,
            last_read_at: epoch(progress.last_read_at),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct BookmarkView {
    pub id: String,
    pub book_id: String,
    pub page: u32,
    pub chapter: Option<u32>,
    pub note: Option<String>,
    pub bookmark_type: String,
    pub metadata: Option<serde_json::Value>,
    pub created: u64,
    pub updated: Option<u64>,
}

impl From<&Bookmark> for BookmarkView {
    fn from(bookmark: &Bookmark) -> Self {
        Self {
            id: bookmark.id.clone(),
            book_id: bookmark.book_id.clone(),
            page: bookmark.page,
            chapter: bookmark.chapter,
            note: bookmark.note.clone(),
            bookmark_type: bookmark.bookmark_type.clone(),
            metadata: bookmark.metadata.clone(),
            created: epoch(bookmark.created),
            updated: bookmark.updated.map(epoch),
        }
    }
}

async fn generate_token(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<GenerateTokenBody>,
) -> Result<Response, ApiError> {
    let issued = state
        .book_access
        .generate_or_reuse(session.user_id, &body.book_id)?;
    Ok(Json(json!({
        "success": true,
        "token": issued.token,
        "expires_at": issued.expires_at,
        "book_url": issued.book_url,
    }))
    .into_response())
}

/// Plain validation for the reader. Failures carry no detail at all.
async fn validate(
    State(state): State<ServerState>,
    Json(body): Json<ValidateBody>,
) -> Result<Response, ApiError> {
    let validated = match state.book_access.validate(&body.token, &body.book_id)? {
        Some(validated) => validated,
        None => return Ok(Json(json!({ "valid": false })).into_response()),
    };
    Ok(Json(json!({
        "valid": true,
        "user_id": validated.user.id,
        "permissions": validated.claims.permissions,
    }))
    .into_response())
}

/// Validation batched with the read-side fetch: bookmarks, progress and a
/// fresh analytics session id come back in the same round trip.
async fn validate_enhanced(
    State(state): State<ServerState>,
    Json(body): Json<ValidateBody>,
) -> Result<Response, ApiError> {
    let validated = match state.book_access.validate(&body.token, &body.book_id)? {
        Some(validated) => validated,
        None => return Ok(Json(json!({ "valid": false })).into_response()),
    };

    let user_id = validated.user.id;
    let bookmarks = state.library_store.get_bookmarks(user_id, &body.book_id)?;
    let progress = state.library_store.get_progress(user_id, &body.book_id)?;
    let analytics_session = state
        .aggregator
        .start_session(user_id, &body.book_id, None, None)?;

    Ok(Json(json!({
        "valid": true,
        "user": PublicUser::from(&validated.user),
        "permissions": validated.claims.permissions,
        "bookmarks": bookmarks.iter().map(BookmarkView::from).collect::<Vec<_>>(),
        "progress": progress.as_ref().map(ProgressView::from),
        "analytics_session_id": analytics_session.id,
    }))
    .into_response())
}

async fn update_progress(
    State(state): State<ServerState>,
    Json(body): Json<UpdateProgressBody>,
) -> Result<Response, ApiError> {
    let validated = state
        .book_access
        .validate(&body.token, &body.book_id)?
        .ok_or_else(|| ApiError::Auth("Invalid book access token".to_string()))?;
    if !validated.claims.has_permission(BookPermission::Progress) {
        return Err(ApiError::Permission(
            "This token does not allow progress updates".to_string(),
        ));
    }

    let user_id = validated.user.id;
    let sync = ProgressSync {
        progress: body.progress.clamp(0.0, 100.0),
        current_page: body.current_page,
        current_chapter: body.current_chapter,
        time_spent: body.time_spent,
    };
    let stored = state
        .library_store
        .apply_progress_sync(user_id, &body.book_id, &sync)?;

    // Bookmarks in the same call replace the stored list wholesale
    if let Some(entries) = body.bookmarks {
        let now = SystemTime::now();
        let bookmarks: Vec<Bookmark> = entries
            .into_iter()
            .filter_map(|entry| {
                let page = entry.page?;
                Some(Bookmark {
                    id: entry.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    user_id,
                    book_id: body.book_id.clone(),
                    page,
                    chapter: entry.chapter,
                    note: entry.note,
                    bookmark_type: entry.bookmark_type.unwrap_or_else(|| "page".to_string()),
                    metadata: entry.metadata,
                    created: now,
                    updated: None,
                })
            })
            .collect();
        state
            .library_store
            .replace_bookmarks(user_id, &body.book_id, &bookmarks)?;
    }

    // A long-lived reading session accumulates the same sync in place
    state
        .aggregator
        .touch_active_session(user_id, &body.book_id, body.time_spent, body.current_page)?;

    Ok(Json(json!({
        "success": true,
        "progress": ProgressView::from(&stored),
    }))
    .into_response())
}

pub fn make_book_access_routes(state: ServerState) -> Router {
    Router::new()
        .route("/generate-token", post(generate_token))
        .route("/validate", post(validate))
        .route("/validate-enhanced", post(validate_enhanced))
        .route("/update-progress", post(update_progress))
        .with_state(state)
}
