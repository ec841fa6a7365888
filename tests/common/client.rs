//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all platform endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;

/// HTTP test client with bearer-token session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Session token attached to requests when present
    pub token: Option<String>,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` or `authenticated_admin()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client pre-authenticated as the seeded regular user
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_EMAIL, TEST_PASS).await
    }

    /// Creates a client pre-authenticated as the seeded admin user
    pub async fn authenticated_admin(base_url: String) -> Self {
        Self::authenticated_as(base_url, ADMIN_EMAIL, ADMIN_PASS).await
    }

    /// Creates a client pre-authenticated with specific credentials
    pub async fn authenticated_as(base_url: String, email: &str, password: &str) -> Self {
        let mut client = Self::new(base_url);

        let response = client.login(email, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Test user authentication failed"
        );
        let body: serde_json::Value = response.json().await.expect("Login body was not JSON");
        client.token = Some(
            body["token"]
                .as_str()
                .expect("Login body carried no token")
                .to_string(),
        );

        client
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Response {
        self.with_auth(builder)
            .send()
            .await
            .unwrap_or_else(|err| panic!("{} request failed: {}", what, err))
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /v1/auth/register
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/auth/register", self.base_url))
                .json(&json!({ "name": name, "email": email, "password": password })),
            "Register",
        )
        .await
    }

    /// POST /v1/auth/login
    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/auth/login", self.base_url))
                .json(&json!({ "email": email, "password": password })),
            "Login",
        )
        .await
    }

    /// GET /v1/auth/verify
    pub async fn verify(&self) -> Response {
        self.send(
            self.client.get(format!("{}/v1/auth/verify", self.base_url)),
            "Verify",
        )
        .await
    }

    /// POST /v1/auth/forgot-password
    pub async fn forgot_password(&self, email: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/auth/forgot-password", self.base_url))
                .json(&json!({ "email": email })),
            "Forgot password",
        )
        .await
    }

    /// POST /v1/auth/reset-password
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/auth/reset-password", self.base_url))
                .json(&json!({ "token": token, "new_password": new_password })),
            "Reset password",
        )
        .await
    }

    // ========================================================================
    // Book Access Endpoints
    // ========================================================================

    /// POST /v1/book-access/generate-token
    pub async fn generate_token(&self, book_id: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/book-access/generate-token", self.base_url))
                .json(&json!({ "book_id": book_id })),
            "Generate token",
        )
        .await
    }

    /// POST /v1/book-access/validate (called by the external reader)
    pub async fn validate(&self, token: &str, book_id: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/book-access/validate", self.base_url))
                .json(&json!({ "token": token, "book_id": book_id })),
            "Validate",
        )
        .await
    }

    /// POST /v1/book-access/validate-enhanced (called by the external reader)
    pub async fn validate_enhanced(&self, token: &str, book_id: &str) -> Response {
        self.send(
            self.client
                .post(format!(
                    "{}/v1/book-access/validate-enhanced",
                    self.base_url
                ))
                .json(&json!({ "token": token, "book_id": book_id })),
            "Validate enhanced",
        )
        .await
    }

    /// POST /v1/book-access/update-progress (called by the external reader)
    pub async fn update_progress(&self, body: serde_json::Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/book-access/update-progress", self.base_url))
                .json(&body),
            "Update progress",
        )
        .await
    }

    // ========================================================================
    // User Content Endpoints
    // ========================================================================

    /// GET /v1/user/progress/{book_id}
    pub async fn get_progress(&self, book_id: &str) -> Response {
        self.send(
            self.client
                .get(format!("{}/v1/user/progress/{}", self.base_url, book_id)),
            "Get progress",
        )
        .await
    }

    /// POST /v1/user/bookmarks/{book_id}
    pub async fn add_bookmark(&self, book_id: &str, body: serde_json::Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/user/bookmarks/{}", self.base_url, book_id))
                .json(&body),
            "Add bookmark",
        )
        .await
    }

    /// PUT /v1/user/bookmarks/id/{bookmark_id}
    pub async fn update_bookmark(&self, bookmark_id: &str, body: serde_json::Value) -> Response {
        self.send(
            self.client
                .put(format!(
                    "{}/v1/user/bookmarks/id/{}",
                    self.base_url, bookmark_id
                ))
                .json(&body),
            "Update bookmark",
        )
        .await
    }

    /// DELETE /v1/user/bookmarks/id/{bookmark_id}
    pub async fn delete_bookmark(&self, bookmark_id: &str) -> Response {
        self.send(
            self.client.delete(format!(
                "{}/v1/user/bookmarks/id/{}",
                self.base_url, bookmark_id
            )),
            "Delete bookmark",
        )
        .await
    }

    // ========================================================================
    // Analytics Endpoints
    // ========================================================================

    /// POST /v1/analytics/session/start
    pub async fn start_session(&self, book_id: &str) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/analytics/session/start", self.base_url))
                .json(&json!({ "book_id": book_id, "device_type": "tablet" })),
            "Start session",
        )
        .await
    }

    /// POST /v1/analytics/session/end
    pub async fn end_session(&self, session_id: &str, body: serde_json::Value) -> Response {
        let mut body = body;
        body["session_id"] = json!(session_id);
        self.send(
            self.client
                .post(format!("{}/v1/analytics/session/end", self.base_url))
                .json(&body),
            "End session",
        )
        .await
    }

    /// POST /v1/analytics/track-enhanced
    pub async fn track_enhanced(&self, body: serde_json::Value) -> Response {
        self.send(
            self.client
                .post(format!("{}/v1/analytics/track-enhanced", self.base_url))
                .json(&body),
            "Track enhanced",
        )
        .await
    }

    /// GET /v1/analytics/summary
    pub async fn get_analytics_summary(&self) -> Response {
        self.send(
            self.client
                .get(format!("{}/v1/analytics/summary", self.base_url)),
            "Get analytics summary",
        )
        .await
    }

    /// DELETE /v1/admin/analytics/{user_id}
    pub async fn admin_reset_analytics(&self, user_id: usize) -> Response {
        self.send(
            self.client
                .delete(format!("{}/v1/admin/analytics/{}", self.base_url, user_id)),
            "Admin reset analytics",
        )
        .await
    }

    // ========================================================================
    // Health Check / System Endpoints
    // ========================================================================

    /// GET /
    pub async fn get_statics(&self) -> Response {
        self.send(self.client.get(format!("{}/", self.base_url)), "Statics")
            .await
    }
}
