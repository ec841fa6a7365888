//! Reading-session lifecycle and analytics event ingestion.

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;
use crate::analytics::{PageVisitEvent, SessionEndMetrics};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug)]
struct StartSessionBody {
    pub book_id: String,
    pub device_type: Option<String>,
    pub browser_info: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EndSessionBody {
    pub session_id: String,
    #[serde(flatten)]
    pub metrics: SessionEndMetrics,
}

#[derive(Deserialize, Debug)]
struct TrackEnhancedBody {
    /// Optional explicit subject; must match the authenticated user.
    pub user_id: Option<usize>,
    #[serde(flatten)]
    pub event: PageVisitEvent,
}

async fn start_session(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<StartSessionBody>,
) -> Result<Response, ApiError> {
    let reading_session = state.aggregator.start_session(
        session.user_id,
        &body.book_id,
        body.device_type,
        body.browser_info,
    )?;
    Ok(Json(json!({
        "success": true,
        "session_id": reading_session.id,
    }))
    .into_response())
}

async fn end_session(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<EndSessionBody>,
) -> Result<Response, ApiError> {
    // Ending a stale or foreign session is a logged no-op, not an error
    let analytics = state
        .aggregator
        .end_session(session.user_id, &body.session_id, &body.metrics)?;
    Ok(Json(json!({
        "success": true,
        "ended": analytics.is_some(),
    }))
    .into_response())
}

async fn track_enhanced(
    session: Session,
    State(state): State<ServerState>,
    Json(body): Json<TrackEnhancedBody>,
) -> Result<Response, ApiError> {
    if let Some(user_id) = body.user_id {
        if user_id != session.user_id {
            return Err(ApiError::Permission(
                "Cannot submit analytics for another user".to_string(),
            ));
        }
    }

    let analytics = state
        .aggregator
        .track_page_visit(session.user_id, &body.event)?;
    Ok(Json(json!({
        "success": true,
        "analytics_summary": analytics,
    }))
    .into_response())
}

async fn get_summary(
    session: Session,
    State(state): State<ServerState>,
) -> Result<Response, ApiError> {
    let analytics = state.aggregator.get_user_analytics(session.user_id)?;
    Ok(Json(json!({
        "success": true,
        "analytics": analytics,
    }))
    .into_response())
}

async fn admin_reset_user_analytics(
    session: Session,
    State(state): State<ServerState>,
    Path(user_id): Path<usize>,
) -> Result<Response, ApiError> {
    if !session.is_admin() {
        return Err(ApiError::Permission(
            "Admin privileges required".to_string(),
        ));
    }
    let deleted = state.aggregator.reset_user_analytics(user_id)?;
    Ok(Json(json!({
        "success": true,
        "deleted": deleted,
    }))
    .into_response())
}

pub fn make_analytics_routes(state: ServerState) -> Router {
    Router::new()
        .route("/session/start", post(start_session))
        .route("/session/end", post(end_session))
        .route("/track-enhanced", post(track_enhanced))
        .route("/summary", get(get_summary))
        .with_state(state)
}

pub fn make_admin_routes(state: ServerState) -> Router {
    Router::new()
        .route("/analytics/{user_id}", delete(admin_reset_user_analytics))
        .with_state(state)
}
