pub mod auth;
pub mod session_tokens;
pub mod user_manager;
pub mod user_models;
pub mod user_store;

mod sqlite_user_store;

pub use auth::StorynestHasher;
pub use session_tokens::{SessionClaims, SessionTokenError, SessionTokenIssuer};
pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::{AuthFlowError, UserManager};
pub use user_models::{
    AccessKind, PasswordCredentials, PasswordResetToken, Purchase, PurchaseStatus,
    SubscriptionStatus, User, UserRole,
};
pub use user_store::{
    EntitlementStore, FullUserStore, PasswordResetStore, UserAccountStore, UserCredentialsStore,
};
