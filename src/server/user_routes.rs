//! Session-authenticated progress reads and fine-grained bookmark CRUD.

use super::book_access_routes::{BookmarkView, ProgressView};
use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;
use crate::library::{Bookmark, ProgressStore};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
struct CreateBookmarkBody {
    pub page: u32,
    pub chapter: Option<u32>,
    pub note: Option<String>,
    pub bookmark_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct UpdateBookmarkBody {
    pub page: Option<u32>,
    pub chapter: Option<u32>,
    pub note: Option<String>,
    pub bookmark_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

async fn get_progress(
    session: Session,
    State(state): State<ServerState>,
    Path(book_id): Path<String>,
) -> Result<Response, ApiError> {
    let progress = state.library_store.get_progress(session.user_id, &book_id)?;
    let bookmarks = state.library_store.get_bookmarks(session.user_id, &book_id)?;
    Ok(Json(json!({
        "success": true,
        "progress": progress.as_ref().map(ProgressView::from),
        "bookmarks": bookmarks.iter().map(BookmarkView::from).collect::<Vec<_>>(),
    }))
    .into_response())
}

async fn add_bookmark(
    session: Session,
    State(state): State<ServerState>,
    Path(book_id): Path<String>,
    Json(body): Json<CreateBookmarkBody>,
) -> Result<Response, ApiError> {
    let bookmark = Bookmark {
        id: Uuid::new_v4().to_string(),
        user_id: session.user_id,
        book_id,
        page: body.page,
        chapter: body.chapter,
        note: body.note,
        bookmark_type: body.bookmark_type.unwrap_or_else(|| "page".to_string()),
        metadata: body.metadata,
        created: SystemTime::now(),
        updated: None,
    };
    state.library_store.add_bookmark(&bookmark)?;
    Ok(Json(json!({
        "success": true,
        "bookmark": BookmarkView::from(&bookmark),
    }))
    .into_response())
}

/// Loads a bookmark and enforces ownership. A bookmark belonging to someone
/// else looks exactly like a missing one, so ids cannot be probed.
fn load_owned_bookmark(
    state: &ServerState,
    session: &Session,
    bookmark_id: &str,
) -> Result<Bookmark, ApiError> {
    let bookmark = state
        .library_store
        .get_bookmark(bookmark_id)?
        .ok_or_else(|| ApiError::NotFound("Bookmark not found".to_string()))?;
    if bookmark.user_id != session.user_id {
        return Err(ApiError::NotFound("Bookmark not found".to_string()));
    }
    Ok(bookmark)
}

async fn update_bookmark(
    session: Session,
    State(state): State<ServerState>,
    Path(bookmark_id): Path<String>,
    Json(body): Json<UpdateBookmarkBody>,
) -> Result<Response, ApiError> {
    let mut bookmark = load_owned_bookmark(&state, &session, &bookmark_id)?;

    if let Some(page) = body.page {
        bookmark.page = page;
    }
    if body.chapter.is_some() {
        bookmark.chapter = body.chapter;
    }
    if body.note.is_some() {
        bookmark.note = body.note;
    }
    if let Some(bookmark_type) = body.bookmark_type {
        bookmark.bookmark_type = bookmark_type;
    }
    if body.metadata.is_some() {
        bookmark.metadata = body.metadata;
    }
    bookmark.updated = Some(SystemTime::now());

    state.library_store.update_bookmark(&bookmark)?;
    Ok(Json(json!({
        "success": true,
        "bookmark": BookmarkView::from(&bookmark),
    }))
    .into_response())
}

async fn delete_bookmark(
    session: Session,
    State(state): State<ServerState>,
    Path(bookmark_id): Path<String>,
) -> Result<Response, ApiError> {
    let bookmark = load_owned_bookmark(&state, &session, &bookmark_id)?;
    state.library_store.delete_bookmark(&bookmark.id)?;
    Ok(Json(json!({ "success": true })).into_response())
}

pub fn make_user_routes(state: ServerState) -> Router {
    Router::new()
        .route("/progress/{book_id}", get(get_progress))
        .route("/bookmarks/{book_id}", post(add_bookmark))
        .route("/bookmarks/id/{bookmark_id}", put(update_bookmark))
        .route("/bookmarks/id/{bookmark_id}", delete(delete_bookmark))
        .with_state(state)
}
