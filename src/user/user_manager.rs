use super::auth::{validate_password_strength, StorynestHasher};
use super::user_models::{PasswordCredentials, PasswordResetToken, User};
use super::user_store::{
    FullUserStore, PasswordResetStore, UserAccountStore, UserCredentialsStore,
};
use anyhow::Result;
use lazy_static::lazy_static;
use rand::Rng;
use rand_distr::Alphanumeric;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info};

/// Reset tokens expire an hour after the forgot-password request.
const RESET_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct UserManager {
    user_store: Arc<dyn FullUserStore>,
    hasher: StorynestHasher,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn FullUserStore>) -> Self {
        Self {
            user_store,
            hasher: StorynestHasher::Argon2,
        }
    }

    pub fn store(&self) -> Arc<dyn FullUserStore> {
        self.user_store.clone()
    }

    /// Lowercases and trims an email; emails compare case-insensitively.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<User, AuthFlowError> {
        let email = Self::normalize_email(email);
        if !EMAIL_RE.is_match(&email) {
            return Err(AuthFlowError::Validation(
                "Please provide a valid email address".to_string(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthFlowError::Validation(
                "Name cannot be empty".to_string(),
            ));
        }
        validate_password_strength(password).map_err(AuthFlowError::Validation)?;

        if self.user_store.get_user_by_email(&email)?.is_some() {
            return Err(AuthFlowError::Validation(
                "An account with this email already exists".to_string(),
            ));
        }

        let user_id = self.user_store.create_user(&email, name)?;
        let credentials = PasswordCredentials {
            user_id,
            hash: self.hasher.hash(password)?,
            hasher: self.hasher.clone(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.upsert_credentials(credentials)?;

        info!("Registered new user {} ({})", user_id, email);
        self.user_store
            .get_user(user_id)?
            .ok_or_else(|| AuthFlowError::Internal(anyhow::anyhow!("user vanished after insert")))
    }

    /// Checks a password against the stored credentials. A missing user and
    /// a wrong password are indistinguishable to the caller.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthFlowError> {
        let email = Self::normalize_email(email);
        let user = match self.user_store.get_user_by_email(&email)? {
            Some(user) => user,
            None => {
                debug!("Login attempt for unknown email");
                return Err(AuthFlowError::InvalidCredentials);
            }
        };
        let credentials = match self.user_store.get_credentials(user.id)? {
            Some(credentials) => credentials,
            None => return Err(AuthFlowError::InvalidCredentials),
        };

        if !credentials.hasher.verify(password, &credentials.hash)? {
            return Err(AuthFlowError::InvalidCredentials);
        }

        self.user_store.touch_credentials_last_used(user.id)?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        self.user_store.get_user(user_id)
    }

    /// Creates a reset token for the account, if one exists. Returns None
    /// for unknown emails; callers answer success-shaped either way so the
    /// endpoint cannot be used to enumerate accounts.
    pub fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<Option<PasswordResetToken>, AuthFlowError> {
        let email = Self::normalize_email(email);
        let user = match self.user_store.get_user_by_email(&email)? {
            Some(user) => user,
            None => {
                debug!("Password reset requested for unknown email");
                return Ok(None);
            }
        };

        let now = SystemTime::now();
        let mut token = PasswordResetToken {
            id: 0,
            user_id: user.id,
            email: email.clone(),
            token: generate_reset_token_value(),
            expires_at: now + RESET_TOKEN_TTL,
            used: false,
            created: now,
        };
        token.id = self.user_store.create_reset_token(&token)?;

        // There is no mailer in this deployment; the delivery hook logs the
        // token id so operators can trace requests without seeing the value.
        info!("Issued password reset token {} for user {}", token.id, user.id);
        Ok(Some(token))
    }

    /// Consumes a reset token exactly once and replaces the password.
    pub fn reset_password(&self, token_value: &str, new_password: &str) -> Result<(), AuthFlowError> {
        let token = self
            .user_store
            .get_reset_token(token_value)?
            .ok_or_else(|| {
                AuthFlowError::Validation("Invalid or expired reset token".to_string())
            })?;

        if !token.is_valid(SystemTime::now()) {
            return Err(AuthFlowError::Validation(
                "Invalid or expired reset token".to_string(),
            ));
        }
        validate_password_strength(new_password).map_err(AuthFlowError::Validation)?;

        let credentials = PasswordCredentials {
            user_id: token.user_id,
            hash: self.hasher.hash(new_password)?,
            hasher: self.hasher.clone(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.upsert_credentials(credentials)?;
        self.user_store.mark_reset_token_used(token.id)?;

        info!("Password reset completed for user {}", token.user_id);
        Ok(())
    }
}

fn generate_reset_token_value() -> String {
    let rng = rand::rng();
    rng.sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::SqliteUserStore;
    use tempfile::TempDir;

    fn make_manager() -> (TempDir, UserManager) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteUserStore::new(dir.path().join("user.db")).unwrap());
        (dir, UserManager::new(store))
    }

    #[test]
    fn register_then_authenticate() {
        let (_dir, manager) = make_manager();

        let user = manager.register("A@X.com", "Ada", "Secret123").unwrap();
        assert_eq!(user.email, "a@x.com");

        let authenticated = manager.authenticate("a@x.com", "Secret123").unwrap();
        assert_eq!(authenticated.id, user.id);

        // Case-insensitive email on login too
        assert!(manager.authenticate("A@X.COM", "Secret123").is_ok());
    }

    #[test]
    fn wrong_password_and_unknown_user_look_identical() {
        let (_dir, manager) = make_manager();
        manager.register("a@x.com", "Ada", "Secret123").unwrap();

        let wrong_pw = manager.authenticate("a@x.com", "WrongPass1").unwrap_err();
        let no_user = manager.authenticate("ghost@x.com", "Secret123").unwrap_err();
        assert_eq!(wrong_pw.to_string(), no_user.to_string());
    }

    #[test]
    fn register_rejects_duplicates_and_weak_passwords() {
        let (_dir, manager) = make_manager();
        manager.register("a@x.com", "Ada", "Secret123").unwrap();

        assert!(matches!(
            manager.register("a@x.com", "Imposter", "Secret123"),
            Err(AuthFlowError::Validation(_))
        ));
        assert!(matches!(
            manager.register("b@x.com", "Bob", "short"),
            Err(AuthFlowError::Validation(_))
        ));
        assert!(matches!(
            manager.register("not-an-email", "Eve", "Secret123"),
            Err(AuthFlowError::Validation(_))
        ));
    }

    #[test]
    fn password_reset_flow() {
        let (_dir, manager) = make_manager();
        manager.register("a@x.com", "Ada", "Secret123").unwrap();

        let token = manager
            .request_password_reset("a@x.com")
            .unwrap()
            .expect("token for existing user");
        assert_eq!(token.token.len(), 64);

        manager.reset_password(&token.token, "NewSecret1").unwrap();
        assert!(manager.authenticate("a@x.com", "NewSecret1").is_ok());
        assert!(manager.authenticate("a@x.com", "Secret123").is_err());

        // A consumed token cannot be replayed
        assert!(matches!(
            manager.reset_password(&token.token, "Another1x"),
            Err(AuthFlowError::Validation(_))
        ));
    }

    #[test]
    fn reset_for_unknown_email_is_silent() {
        let (_dir, manager) = make_manager();
        assert!(manager
            .request_password_reset("ghost@x.com")
            .unwrap()
            .is_none());
    }
}
