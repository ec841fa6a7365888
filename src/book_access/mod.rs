//! Book access tokens.
//!
//! A second class of signed token, scoped to one book and a permission set,
//! handed to the externally hosted reader. At most one valid outstanding
//! token exists per (user, book) pair: repeated "Read Book" clicks reuse the
//! stored token so an open reader session is never invalidated.

use crate::analytics::AnalyticsAggregator;
use crate::library::{AccessTokenStore, Book, BookAccessRecord, BookStore, LibraryStore};
use crate::user::{
    AccessKind, EntitlementStore, FullUserStore, Purchase, PurchaseStatus, User, UserAccountStore,
};
use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookPermission {
    Read,
    Bookmark,
    Progress,
}

/// Claims carried by every book access token. Expiry is an explicit option:
/// a token configured to never expire simply has no `exp` claim, so expiry
/// is validated manually instead of through the JWT library default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAccessClaims {
    /// Numeric user id.
    pub sub: usize,
    pub book_id: String,
    /// Entitlement row backing this token, `"{user_id}-{book_id}"`.
    pub purchase_id: String,
    pub permissions: Vec<BookPermission>,
    /// Issued-at (Unix timestamp, seconds).
    pub iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl BookAccessClaims {
    pub fn has_permission(&self, permission: BookPermission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedBookAccess {
    pub token: String,
    pub expires_at: Option<u64>,
    pub book_url: String,
}

/// A successfully validated token plus the user behind it.
#[derive(Debug, Clone)]
pub struct ValidatedAccess {
    pub claims: BookAccessClaims,
    pub user: User,
}

#[derive(Debug, Error)]
pub enum BookAccessError {
    #[error("Unknown user")]
    UnknownUser,
    #[error("Unknown book")]
    UnknownBook,
    #[error("You do not have access to this book")]
    NotEntitled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct BookAccessSettings {
    pub secret: String,
    /// None means issued tokens never expire.
    pub token_expiry_days: Option<u64>,
    /// Base URL of the externally hosted reader.
    pub reader_base_url: String,
    /// Identifier the reader uses to tell platforms apart.
    pub platform_id: String,
    /// Where the reader sends the child when they close the book.
    pub library_url: String,
}

pub struct BookAccessManager {
    user_store: Arc<dyn FullUserStore>,
    library_store: Arc<dyn LibraryStore>,
    aggregator: Arc<AnalyticsAggregator>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    settings: BookAccessSettings,
    /// Serializes the cache-check-then-mint sequence so concurrent requests
    /// for the same (user, book) cannot both take the miss branch.
    mint_lock: Mutex<()>,
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_secs()
}

impl BookAccessManager {
    pub fn new(
        user_store: Arc<dyn FullUserStore>,
        library_store: Arc<dyn LibraryStore>,
        aggregator: Arc<AnalyticsAggregator>,
        settings: BookAccessSettings,
    ) -> Self {
        Self {
            user_store,
            library_store,
            aggregator,
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            settings,
            mint_lock: Mutex::new(()),
        }
    }

    /// Entitlement policy, evaluated at request time: the free book is open
    /// to every authenticated user, anything else needs a completed purchase.
    pub fn is_entitled(&self, user_id: usize, book: &Book) -> Result<bool> {
        if book.access == AccessKind::Free {
            return Ok(true);
        }
        let purchase = self.user_store.get_purchase(user_id, &book.id)?;
        Ok(matches!(
            purchase,
            Some(Purchase {
                status: PurchaseStatus::Completed,
                ..
            })
        ))
    }

    /// Returns the stored token for (user, book) when one is still valid,
    /// minting a new one only when absent or expired.
    pub fn generate_or_reuse(
        &self,
        user_id: usize,
        book_id: &str,
    ) -> Result<IssuedBookAccess, BookAccessError> {
        let _guard = self.mint_lock.lock().unwrap();

        let user = self
            .user_store
            .get_user(user_id)
            .map_err(BookAccessError::Internal)?
            .ok_or(BookAccessError::UnknownUser)?;
        let book = self
            .library_store
            .get_book(book_id)
            .map_err(BookAccessError::Internal)?
            .ok_or(BookAccessError::UnknownBook)?;
        if !self.is_entitled(user.id, &book)? {
            return Err(BookAccessError::NotEntitled);
        }

        let now = now_epoch();
        if let Some(record) = self
            .library_store
            .get_access_record(user.id, &book.id)
            .map_err(BookAccessError::Internal)?
        {
            if !record.is_expired(now) {
                self.library_store
                    .touch_access_record(user.id, &book.id)
                    .map_err(BookAccessError::Internal)?;
                debug!("Reusing access token for user {} book {}", user.id, book.id);
                return Ok(IssuedBookAccess {
                    book_url: self.build_book_url(&book, &record.token),
                    token: record.token,
                    expires_at: record.expires_at,
                });
            }
        }

        let purchase_id = self.ensure_purchase(user.id, &book)?;
        let expires_at = self.settings.token_expiry_days.map(|days| now + days * 86_400);
        let claims = BookAccessClaims {
            sub: user.id,
            book_id: book.id.clone(),
            purchase_id,
            permissions: vec![
                BookPermission::Read,
                BookPermission::Bookmark,
                BookPermission::Progress,
            ],
            iat: now,
            exp: expires_at,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| BookAccessError::Internal(err.into()))?;

        let record = BookAccessRecord {
            id: format!("{}-{}", user.id, book.id),
            user_id: user.id,
            book_id: book.id.clone(),
            token: token.clone(),
            expires_at,
            created: SystemTime::now(),
            last_used: SystemTime::now(),
        };
        self.library_store
            .put_access_record(&record)
            .map_err(BookAccessError::Internal)?;

        // First-touch analytics initialization for the user.
        self.aggregator
            .ensure_profile(user.id)
            .map_err(BookAccessError::Internal)?;

        info!("Minted access token for user {} book {}", user.id, book.id);
        Ok(IssuedBookAccess {
            book_url: self.build_book_url(&book, &token),
            token,
            expires_at,
        })
    }

    /// Validation entry point for the external reader. Any failure collapses
    /// to None so the caller learns nothing about why.
    pub fn validate(&self, token: &str, book_id: &str) -> Result<Option<ValidatedAccess>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let claims = match decode::<BookAccessClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!("Book token rejected: {}", err);
                return Ok(None);
            }
        };

        if claims.book_id != book_id {
            debug!("Book token for {} presented for {}", claims.book_id, book_id);
            return Ok(None);
        }
        if let Some(exp) = claims.exp {
            if exp <= now_epoch() {
                debug!("Book token for user {} expired", claims.sub);
                return Ok(None);
            }
        }
        let user = match self.user_store.get_user(claims.sub)? {
            Some(user) => user,
            None => {
                debug!("Book token for missing user {}", claims.sub);
                return Ok(None);
            }
        };

        Ok(Some(ValidatedAccess { claims, user }))
    }

    fn ensure_purchase(&self, user_id: usize, book: &Book) -> Result<String, BookAccessError> {
        if let Some(purchase) = self
            .user_store
            .get_purchase(user_id, &book.id)
            .map_err(BookAccessError::Internal)?
        {
            return Ok(purchase.id);
        }
        // Only reachable for the free book: entitlement was already checked
        // and paid books without a purchase row were rejected there.
        let purchase = Purchase {
            id: Purchase::make_id(user_id, &book.id),
            user_id,
            book_id: book.id.clone(),
            status: PurchaseStatus::Completed,
            access_type: AccessKind::Free,
            purchased_at: SystemTime::now(),
        };
        self.user_store
            .record_purchase(&purchase)
            .map_err(BookAccessError::Internal)?;
        Ok(purchase.id)
    }

    fn build_book_url(&self, book: &Book, token: &str) -> String {
        format!(
            "{}/{}?token={}&platform={}&return_url={}",
            self.settings.reader_base_url.trim_end_matches('/'),
            book.slug,
            token,
            self.settings.platform_id,
            urlencoding::encode(&self.settings.library_url),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::SqliteAnalyticsStore;
    use crate::library::SqliteLibraryStore;
    use crate::user::SqliteUserStore;
    use tempfile::TempDir;

    const FREE_BOOK: &str = "wtbtg";
    const PAID_BOOK: &str = "moonlight";

    struct Fixture {
        _dir: TempDir,
        user_store: Arc<SqliteUserStore>,
        library_store: Arc<SqliteLibraryStore>,
        manager: BookAccessManager,
        user_id: usize,
    }

    fn make_fixture(token_expiry_days: Option<u64>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db")).unwrap());
        let library_store =
            Arc::new(SqliteLibraryStore::new(dir.path().join("library.db")).unwrap());
        let analytics_store =
            Arc::new(SqliteAnalyticsStore::new(dir.path().join("analytics.db")).unwrap());
        let aggregator = Arc::new(AnalyticsAggregator::new(analytics_store));

        library_store
            .upsert_book(&Book {
                id: FREE_BOOK.to_string(),
                title: "Where the Bright Things Grow".to_string(),
                slug: FREE_BOOK.to_string(),
                access: AccessKind::Free,
            })
            .unwrap();
        library_store
            .upsert_book(&Book {
                id: PAID_BOOK.to_string(),
                title: "Moonlight Menagerie".to_string(),
                slug: PAID_BOOK.to_string(),
                access: AccessKind::Purchased,
            })
            .unwrap();

        let user_id = user_store.create_user("a@x.com", "Ada").unwrap();

        let manager = BookAccessManager::new(
            user_store.clone(),
            library_store.clone(),
            aggregator,
            BookAccessSettings {
                secret: "test-book-secret".to_string(),
                token_expiry_days,
                reader_base_url: "https://reader.example.com".to_string(),
                platform_id: "storynest-web".to_string(),
                library_url: "https://storynest.example.com/library".to_string(),
            },
        );

        Fixture {
            _dir: dir,
            user_store,
            library_store,
            manager,
            user_id,
        }
    }

    #[test]
    fn free_book_auto_entitles_and_mints() {
        let fixture = make_fixture(Some(30));

        let issued = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        assert!(issued.expires_at.is_some());
        assert!(issued.book_url.contains(&issued.token));
        assert!(issued.book_url.contains("platform=storynest-web"));
        assert!(issued.book_url.contains("return_url="));

        // The synthesized entitlement row exists afterwards
        let purchase = fixture
            .user_store
            .get_purchase(fixture.user_id, FREE_BOOK)
            .unwrap()
            .unwrap();
        assert_eq!(purchase.access_type, AccessKind::Free);
        assert_eq!(purchase.status, PurchaseStatus::Completed);
    }

    #[test]
    fn token_is_reused_until_expiry() {
        let fixture = make_fixture(Some(30));

        let first = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        let second = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        assert_eq!(first.token, second.token);
    }

    #[test]
    fn reuse_refreshes_last_used() {
        let fixture = make_fixture(Some(30));

        fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        let before = fixture
            .library_store
            .get_access_record(fixture.user_id, FREE_BOOK)
            .unwrap()
            .unwrap()
            .last_used;

        // last_used has second granularity; cross the boundary
        std::thread::sleep(std::time::Duration::from_millis(1200));
        fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        let after = fixture
            .library_store
            .get_access_record(fixture.user_id, FREE_BOOK)
            .unwrap()
            .unwrap()
            .last_used;
        assert!(after > before);
    }

    #[test]
    fn expired_token_is_replaced() {
        let fixture = make_fixture(Some(30));

        let first = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();

        let mut record = fixture
            .library_store
            .get_access_record(fixture.user_id, FREE_BOOK)
            .unwrap()
            .unwrap();
        record.expires_at = Some(1);
        fixture.library_store.put_access_record(&record).unwrap();

        let second = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn no_expiry_configuration_omits_exp() {
        let fixture = make_fixture(None);

        let issued = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();
        assert!(issued.expires_at.is_none());

        let validated = fixture
            .manager
            .validate(&issued.token, FREE_BOOK)
            .unwrap()
            .expect("eternal token validates");
        assert!(validated.claims.exp.is_none());
    }

    #[test]
    fn paid_book_requires_completed_purchase() {
        let fixture = make_fixture(Some(30));

        let err = fixture
            .manager
            .generate_or_reuse(fixture.user_id, PAID_BOOK)
            .unwrap_err();
        assert!(matches!(err, BookAccessError::NotEntitled));

        fixture
            .user_store
            .record_purchase(&Purchase {
                id: Purchase::make_id(fixture.user_id, PAID_BOOK),
                user_id: fixture.user_id,
                book_id: PAID_BOOK.to_string(),
                status: PurchaseStatus::Completed,
                access_type: AccessKind::Purchased,
                purchased_at: SystemTime::now(),
            })
            .unwrap();

        assert!(fixture
            .manager
            .generate_or_reuse(fixture.user_id, PAID_BOOK)
            .is_ok());
    }

    #[test]
    fn pending_purchase_is_not_entitlement() {
        let fixture = make_fixture(Some(30));

        fixture
            .user_store
            .record_purchase(&Purchase {
                id: Purchase::make_id(fixture.user_id, PAID_BOOK),
                user_id: fixture.user_id,
                book_id: PAID_BOOK.to_string(),
                status: PurchaseStatus::Pending,
                access_type: AccessKind::Purchased,
                purchased_at: SystemTime::now(),
            })
            .unwrap();

        let err = fixture
            .manager
            .generate_or_reuse(fixture.user_id, PAID_BOOK)
            .unwrap_err();
        assert!(matches!(err, BookAccessError::NotEntitled));
    }

    #[test]
    fn unknown_book_and_user() {
        let fixture = make_fixture(Some(30));

        assert!(matches!(
            fixture.manager.generate_or_reuse(fixture.user_id, "ghost"),
            Err(BookAccessError::UnknownBook)
        ));
        assert!(matches!(
            fixture.manager.generate_or_reuse(999, FREE_BOOK),
            Err(BookAccessError::UnknownUser)
        ));
    }

    #[test]
    fn validate_checks_book_binding_and_expiry() {
        let fixture = make_fixture(Some(30));

        let issued = fixture
            .manager
            .generate_or_reuse(fixture.user_id, FREE_BOOK)
            .unwrap();

        let validated = fixture
            .manager
            .validate(&issued.token, FREE_BOOK)
            .unwrap()
            .expect("valid token");
        assert_eq!(validated.user.id, fixture.user_id);
        assert!(validated.claims.has_permission(BookPermission::Progress));

        // Wrong book, garbage token: both collapse to None
        assert!(fixture
            .manager
            .validate(&issued.token, PAID_BOOK)
            .unwrap()
            .is_none());
        assert!(fixture.manager.validate("garbage", FREE_BOOK).unwrap().is_none());
    }
}
