//! User data models

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::StorynestHasher;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: usize,
    /// Stored lowercased; emails compare case-insensitively.
    pub email: String,
    pub name: String,
    pub subscription: SubscriptionStatus,
    pub role: UserRole,
    pub created: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Free,
    Premium,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionStatus::Free),
            "premium" => Some(SubscriptionStatus::Premium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
    Preview,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Preview => "preview",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            "preview" => Some(UserRole::Preview),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PasswordCredentials {
    pub user_id: usize,
    /// PHC-format digest, salt embedded.
    pub hash: String,
    pub hasher: StorynestHasher,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
}

/// Single-use token mailed out by the forgot-password flow.
/// Valid only while `!used && expires_at > now`.
#[derive(Clone, Debug)]
pub struct PasswordResetToken {
    pub id: usize,
    pub user_id: usize,
    pub email: String,
    pub token: String,
    pub expires_at: SystemTime,
    pub used: bool,
    pub created: SystemTime,
}

impl PasswordResetToken {
    pub fn is_valid(&self, now: SystemTime) -> bool {
        !self.used && self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Free,
    Purchased,
}

impl AccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessKind::Free => "free",
            AccessKind::Purchased => "purchased",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(AccessKind::Free),
            "purchased" => Some(AccessKind::Purchased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Completed,
    Pending,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(PurchaseStatus::Completed),
            "pending" => Some(PurchaseStatus::Pending),
            _ => None,
        }
    }
}

/// Entitlement record linking a user to a book.
#[derive(Debug, Clone, Serialize)]
pub struct Purchase {
    /// `"{user_id}-{book_id}"`, one row per pair.
    pub id: String,
    pub user_id: usize,
    pub book_id: String,
    pub status: PurchaseStatus,
    pub access_type: AccessKind,
    pub purchased_at: SystemTime,
}

impl Purchase {
    pub fn make_id(user_id: usize, book_id: &str) -> String {
        format!("{}-{}", user_id, book_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrip() {
        for role in [UserRole::User, UserRole::Admin, UserRole::Preview] {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::from_str("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("superadmin"), None);
    }

    #[test]
    fn subscription_roundtrip() {
        for status in [SubscriptionStatus::Free, SubscriptionStatus::Premium] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::from_str("gold"), None);
    }

    #[test]
    fn reset_token_validity() {
        let now = SystemTime::now();
        let token = PasswordResetToken {
            id: 1,
            user_id: 1,
            email: "a@x.com".to_string(),
            token: "abc".to_string(),
            expires_at: now + std::time::Duration::from_secs(3600),
            used: false,
            created: now,
        };
        assert!(token.is_valid(now));

        let used = PasswordResetToken {
            used: true,
            ..token.clone()
        };
        assert!(!used.is_valid(now));

        let expired = PasswordResetToken {
            expires_at: now - std::time::Duration::from_secs(1),
            ..token
        };
        assert!(!expired.is_valid(now));
    }

    #[test]
    fn purchase_id_convention() {
        assert_eq!(Purchase::make_id(7, "wtbtg"), "7-wtbtg");
    }
}
