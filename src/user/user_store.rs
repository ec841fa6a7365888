use super::user_models::{
    PasswordCredentials, PasswordResetToken, Purchase, SubscriptionStatus, User, UserRole,
};
use anyhow::Result;
use std::time::SystemTime;

pub trait UserAccountStore: Send + Sync {
    /// Creates a new user and returns the user id.
    /// The email must already be normalized (trimmed, lowercased).
    fn create_user(&self, email: &str, name: &str) -> Result<usize>;

    /// Returns the full user record for the given user id.
    /// Returns Ok(None) if the user does not exist.
    /// Returns Err if there is a database error.
    fn get_user(&self, user_id: usize) -> Result<Option<User>>;

    /// Returns the user with the given (normalized) email.
    /// Returns Ok(None) if no such user exists.
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Returns all users' emails.
    fn get_all_user_emails(&self) -> Result<Vec<String>>;

    /// Changes a user's role.
    fn set_user_role(&self, user_id: usize, role: UserRole) -> Result<()>;

    /// Changes a user's subscription tier.
    fn set_subscription(&self, user_id: usize, status: SubscriptionStatus) -> Result<()>;
}

pub trait UserCredentialsStore: Send + Sync {
    /// Returns the user's password credentials.
    /// Returns Ok(None) if the user has no password set.
    fn get_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>>;

    /// Inserts or replaces the user's password credentials.
    fn upsert_credentials(&self, credentials: PasswordCredentials) -> Result<()>;

    /// Updates the credentials' last_used timestamp after a successful login.
    fn touch_credentials_last_used(&self, user_id: usize) -> Result<()>;
}

pub trait PasswordResetStore: Send + Sync {
    /// Stores a new reset token and returns its id.
    fn create_reset_token(&self, token: &PasswordResetToken) -> Result<usize>;

    /// Looks up a reset token by its value.
    /// Returns Ok(None) if no such token exists.
    fn get_reset_token(&self, value: &str) -> Result<Option<PasswordResetToken>>;

    /// Returns the user's most recently created reset token, if any. Used by
    /// the delivery hook and by operators tracing a stuck reset.
    fn get_latest_reset_token_for_user(
        &self,
        user_id: usize,
    ) -> Result<Option<PasswordResetToken>>;

    /// Marks a reset token consumed. Consuming is one-way.
    fn mark_reset_token_used(&self, id: usize) -> Result<()>;

    /// Deletes tokens that expired before `now`.
    /// Returns the number of tokens deleted.
    fn prune_expired_reset_tokens(&self, now: SystemTime) -> Result<usize>;
}

pub trait EntitlementStore: Send + Sync {
    /// Returns the purchase record for a (user, book) pair, if any.
    fn get_purchase(&self, user_id: usize, book_id: &str) -> Result<Option<Purchase>>;

    /// Inserts or replaces a purchase record (one row per (user, book)).
    fn record_purchase(&self, purchase: &Purchase) -> Result<()>;

    /// Returns all of a user's purchase records.
    fn get_user_purchases(&self, user_id: usize) -> Result<Vec<Purchase>>;
}

/// Combined trait for the full user storage surface.
pub trait FullUserStore:
    UserAccountStore + UserCredentialsStore + PasswordResetStore + EntitlementStore
{
}

// Blanket implementation for any type implementing all user store traits
impl<T: UserAccountStore + UserCredentialsStore + PasswordResetStore + EntitlementStore>
    FullUserStore for T
{
}
