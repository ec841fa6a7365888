use super::error::ApiError;
use super::state::ServerState;
use crate::user::UserRole;

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

/// An authenticated platform session, extracted from the bearer token (or
/// the session cookie) on the request.
#[derive(Debug)]
pub struct Session {
    pub user_id: usize,
    pub email: String,
    pub role: UserRole,
    pub token: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

async fn extract_session_token_from_cookies(parts: &mut Parts, ctx: &ServerState) -> Option<String> {
    CookieJar::from_request_parts(parts, ctx)
        .await
        .ok()?
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &mut Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?;
    let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
    // Bearer-style headers carry a scheme prefix, raw tokens are accepted too
    Some(
        value
            .strip_prefix("Bearer ")
            .map(|s| s.to_string())
            .unwrap_or(value),
    )
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Session, ApiError> {
    let token = match extract_session_token_from_cookies(parts, ctx)
        .await
        .or_else(|| extract_session_token_from_headers(parts))
    {
        None => {
            debug!("No session token in cookies nor headers");
            return Err(ApiError::Auth("Authentication required".to_string()));
        }
        Some(token) => token,
    };

    let claims = ctx
        .session_tokens
        .verify(&token)
        .map_err(|err| ApiError::Auth(err.to_string()))?;

    // The token signature proves identity, but the role is looked up live so
    // demotions take effect without waiting out the token expiry.
    let user = ctx
        .user_manager
        .get_user(claims.sub)
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Auth("Unknown user".to_string()))?;

    Ok(Session {
        user_id: user.id,
        email: user.email,
        role: user.role,
        token,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(extract_session_from_request_parts(parts, ctx).await.ok())
    }
}
