//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (user credentials, book ids, etc.),
//! update only this file.

// ============================================================================
// Test User Credentials
// ============================================================================

/// Regular test user email
pub const TEST_EMAIL: &str = "reader@example.com";

/// Regular test user name
pub const TEST_NAME: &str = "Test Reader";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// Admin test user email
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Admin test user name
pub const ADMIN_NAME: &str = "Test Admin";

/// Admin test user password
pub const ADMIN_PASS: &str = "adminpass123";

// ============================================================================
// Test Catalog
// ============================================================================

/// The platform's designated free book, auto-granted to every user
pub const FREE_BOOK_ID: &str = "wtbtg";

/// A book that requires a completed purchase
pub const PAID_BOOK_ID: &str = "moonlight";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Session token secret used by test servers
pub const TEST_SESSION_SECRET: &str = "e2e-test-session-secret";
