use axum::extract::FromRef;

use crate::analytics::AnalyticsAggregator;
use crate::book_access::BookAccessManager;
use crate::library::LibraryStore;
use crate::rate_limit::AuthRateLimits;
use crate::user::{SessionTokenIssuer, UserManager};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedLibraryStore = Arc<dyn LibraryStore>;
pub type GuardedBookAccessManager = Arc<BookAccessManager>;
pub type GuardedAggregator = Arc<AnalyticsAggregator>;
pub type GuardedSessionTokenIssuer = Arc<SessionTokenIssuer>;
pub type GuardedAuthRateLimits = Arc<AuthRateLimits>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_manager: GuardedUserManager,
    pub library_store: GuardedLibraryStore,
    pub book_access: GuardedBookAccessManager,
    pub aggregator: GuardedAggregator,
    pub session_tokens: GuardedSessionTokenIssuer,
    pub auth_rate_limits: GuardedAuthRateLimits,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedLibraryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.library_store.clone()
    }
}

impl FromRef<ServerState> for GuardedBookAccessManager {
    fn from_ref(input: &ServerState) -> Self {
        input.book_access.clone()
    }
}

impl FromRef<ServerState> for GuardedAggregator {
    fn from_ref(input: &ServerState) -> Self {
        input.aggregator.clone()
    }
}

impl FromRef<ServerState> for GuardedSessionTokenIssuer {
    fn from_ref(input: &ServerState) -> Self {
        input.session_tokens.clone()
    }
}

impl FromRef<ServerState> for GuardedAuthRateLimits {
    fn from_ref(input: &ServerState) -> Self {
        input.auth_rate_limits.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
