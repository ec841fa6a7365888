use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::analytics::{AnalyticsAggregator, AnalyticsStore};
use crate::book_access::BookAccessManager;
use crate::library::LibraryStore;
use crate::rate_limit::AuthRateLimits;
use crate::user::{FullUserStore, SessionTokenIssuer, UserManager};

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use super::analytics_routes::{make_admin_routes, make_analytics_routes};
use super::auth_routes::make_auth_routes;
use super::book_access_routes::make_book_access_routes;
use super::metrics::metrics_handler;
use super::session::Session;
use super::state::ServerState;
use super::user_routes::make_user_routes;
use super::{log_requests, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_user: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_user: session.map(|s| s.email),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    user_store: Arc<dyn FullUserStore>,
    library_store: Arc<dyn LibraryStore>,
    analytics_store: Arc<dyn AnalyticsStore>,
) -> Result<Router> {
    let user_manager = Arc::new(UserManager::new(user_store.clone()));
    let session_tokens = Arc::new(SessionTokenIssuer::new(
        &config.session_secret,
        config.session_expiry_days,
    ));
    let aggregator = Arc::new(AnalyticsAggregator::new(analytics_store));
    let book_access = Arc::new(BookAccessManager::new(
        user_store,
        library_store.clone(),
        aggregator.clone(),
        config.book_access.clone(),
    ));

    let state = ServerState {
        config,
        start_time: Instant::now(),
        user_manager,
        library_store,
        book_access,
        aggregator,
        session_tokens,
        auth_rate_limits: Arc::new(AuthRateLimits::default()),
        hash: env!("GIT_HASH").to_string(),
    };

    // The reader is served from another origin and calls straight back in
    let book_access_routes = make_book_access_routes(state.clone()).layer(CorsLayer::permissive());

    let app: Router = Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone())
        .nest("/v1/auth", make_auth_routes(state.clone()))
        .nest("/v1/book-access", book_access_routes)
        .nest("/v1/user", make_user_routes(state.clone()))
        .nest("/v1/analytics", make_analytics_routes(state.clone()))
        .nest("/v1/admin", make_admin_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    user_store: Arc<dyn FullUserStore>,
    library_store: Arc<dyn LibraryStore>,
    analytics_store: Arc<dyn AnalyticsStore>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, user_store, library_store, analytics_store)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on port {}", port);

    Ok(axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?)
}
