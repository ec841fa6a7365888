//! Authentication endpoints: register, login, verify, password reset.

use super::error::ApiError;
use super::metrics::record_login_attempt;
use super::session::Session;
use super::state::ServerState;
use crate::rate_limit::RateLimiter;
use crate::user::{User, UserManager};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::time::UNIX_EPOCH;

/// User shape returned by the API; never includes credential material.
#[derive(Serialize)]
pub(crate) struct PublicUser {
    pub id: usize,
    pub email: String,
    pub name: String,
    pub subscription: crate::user::SubscriptionStatus,
    pub role: crate::user::UserRole,
    pub created: u64,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            subscription: user.subscription,
            role: user.role,
            created: user
                .created
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RegisterBody {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
struct ForgotPasswordBody {
    pub email: String,
}

#[derive(Deserialize, Debug)]
struct ResetPasswordBody {
    pub token: String,
    pub new_password: String,
}

fn check_limiter(limiter: &RateLimiter, key: &str, endpoint: &str, kind: &str) -> Result<(), ApiError> {
    let decision = limiter.check(key);
    if !decision.allowed {
        super::metrics::record_rate_limit_hit(endpoint, kind);
        return Err(ApiError::RateLimited(
            decision
                .message
                .unwrap_or_else(|| "Too many attempts. Please try again later.".to_string()),
        ));
    }
    Ok(())
}

async fn register(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<RegisterBody>,
) -> Result<Response, ApiError> {
    let ip_key = addr.ip().to_string();
    check_limiter(
        &state.auth_rate_limits.register_ip,
        &ip_key,
        "/v1/auth/register",
        "ip",
    )?;

    let user = match state
        .user_manager
        .register(&body.email, &body.name, &body.password)
    {
        Ok(user) => user,
        Err(err) => {
            state.auth_rate_limits.register_ip.record_failure(&ip_key);
            return Err(err.into());
        }
    };

    let token = state.session_tokens.issue(user.id, &user.email)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "token": token,
            "user": PublicUser::from(&user),
        })),
    )
        .into_response())
}

async fn login(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    let email_key = UserManager::normalize_email(&body.email);
    let ip_key = addr.ip().to_string();

    // Two independent limiters guard this action: lock out a hammered
    // account and a hammering address separately.
    check_limiter(
        &state.auth_rate_limits.login_email,
        &email_key,
        "/v1/auth/login",
        "email",
    )?;
    check_limiter(
        &state.auth_rate_limits.login_ip,
        &ip_key,
        "/v1/auth/login",
        "ip",
    )?;

    let user = match state.user_manager.authenticate(&body.email, &body.password) {
        Ok(user) => user,
        Err(err) => {
            state.auth_rate_limits.login_email.record_failure(&email_key);
            state.auth_rate_limits.login_ip.record_failure(&ip_key);
            record_login_attempt("failure");
            return Err(err.into());
        }
    };

    // Successful login clears both counters
    state.auth_rate_limits.login_email.reset(&email_key);
    state.auth_rate_limits.login_ip.reset(&ip_key);
    record_login_attempt("success");

    let token = state.session_tokens.issue(user.id, &user.email)?;
    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": PublicUser::from(&user),
    }))
    .into_response())
}

async fn verify(session: Session, State(state): State<ServerState>) -> Result<Response, ApiError> {
    let user = state
        .user_manager
        .get_user(session.user_id)?
        .ok_or_else(|| ApiError::Auth("Unknown user".to_string()))?;
    Ok(Json(json!({
        "success": true,
        "user": PublicUser::from(&user),
    }))
    .into_response())
}

async fn forgot_password(
    State(state): State<ServerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<ForgotPasswordBody>,
) -> Result<Response, ApiError> {
    let ip_key = addr.ip().to_string();
    check_limiter(
        &state.auth_rate_limits.reset_request_ip,
        &ip_key,
        "/v1/auth/forgot-password",
        "ip",
    )?;
    // Every request counts against the window, found account or not
    state
        .auth_rate_limits
        .reset_request_ip
        .record_failure(&ip_key);

    // Success-shaped regardless of outcome, so the endpoint cannot be used
    // to probe which emails have accounts.
    let _ = state.user_manager.request_password_reset(&body.email)?;
    Ok(Json(json!({
        "success": true,
        "message": "If an account exists for that address, a reset link is on its way.",
    }))
    .into_response())
}

async fn reset_password(
    State(state): State<ServerState>,
    Json(body): Json<ResetPasswordBody>,
) -> Result<Response, ApiError> {
    state
        .user_manager
        .reset_password(&body.token, &body.new_password)?;
    Ok(Json(json!({
        "success": true,
        "message": "Your password has been updated. You can sign in now.",
    }))
    .into_response())
}

pub fn make_auth_routes(state: ServerState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify", get(verify))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .with_state(state)
}
