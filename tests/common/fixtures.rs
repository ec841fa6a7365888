//! Test fixture creation: temp databases seeded with users and books

use super::constants::*;
use anyhow::Result;
use std::sync::Arc;
use std::time::SystemTime;
use storynest_server::library::{Book, BookStore, SqliteLibraryStore};
use storynest_server::user::{
    AccessKind, PasswordCredentials, SqliteUserStore, StorynestHasher, UserAccountStore,
    UserCredentialsStore, UserRole,
};
use storynest_server::SqliteAnalyticsStore;
use tempfile::TempDir;

/// Creates temp SQLite stores seeded with a regular user, an admin user,
/// the free book and a purchase-gated book.
pub fn create_test_stores() -> Result<(
    TempDir,
    Arc<SqliteUserStore>,
    Arc<SqliteLibraryStore>,
    Arc<SqliteAnalyticsStore>,
)> {
    let dir = TempDir::new()?;

    let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db"))?);
    let library_store = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db"))?);
    let analytics_store = Arc::new(SqliteAnalyticsStore::new(dir.path().join("analytics.db"))?);

    create_user_with_password(&user_store, TEST_EMAIL, TEST_NAME, TEST_PASS, UserRole::User)?;
    create_user_with_password(
        &user_store,
        ADMIN_EMAIL,
        ADMIN_NAME,
        ADMIN_PASS,
        UserRole::Admin,
    )?;

    library_store.upsert_book(&Book {
        id: FREE_BOOK_ID.to_string(),
        title: "Where the Bright Things Grow".to_string(),
        slug: FREE_BOOK_ID.to_string(),
        access: AccessKind::Free,
    })?;
    library_store.upsert_book(&Book {
        id: PAID_BOOK_ID.to_string(),
        title: "Moonlight Menagerie".to_string(),
        slug: PAID_BOOK_ID.to_string(),
        access: AccessKind::Purchased,
    })?;

    Ok((dir, user_store, library_store, analytics_store))
}

/// Creates a user with the given credentials and role
pub fn create_user_with_password(
    store: &SqliteUserStore,
    email: &str,
    name: &str,
    password: &str,
    role: UserRole,
) -> Result<usize> {
    let user_id = store.create_user(email, name)?;
    if role != UserRole::User {
        store.set_user_role(user_id, role)?;
    }

    let hasher = StorynestHasher::Argon2;
    let credentials = PasswordCredentials {
        user_id,
        hash: hasher.hash(password)?,
        hasher,
        created: SystemTime::now(),
        last_used: None,
    };
    store.upsert_credentials(credentials)?;

    Ok(user_id)
}
