use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
use crate::user::user_models::{
    AccessKind, PasswordCredentials, PasswordResetToken, Purchase, PurchaseStatus,
    SubscriptionStatus, User, UserRole,
};
use crate::user::user_store::{
    EntitlementStore, PasswordResetStore, UserAccountStore, UserCredentialsStore,
};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const USER_TABLE_V_1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("subscription", &SqlType::Text, non_null = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_email", "email")],
};

const PASSWORD_CREDENTIALS_TABLE_V_1: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[],
};

const PASSWORD_RESET_TOKEN_TABLE_V_1: Table = Table {
    name: "password_reset_token",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("token", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
        sqlite_column!("used", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_password_reset_token_value", "token")],
};

const PURCHASE_TABLE_V_1: Table = Table {
    name: "purchase",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("book_id", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("access_type", &SqlType::Text, non_null = true),
        sqlite_column!(
            "purchased_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["user_id", "book_id"]],
    indices: &[("idx_purchase_user_id", "user_id")],
};

pub const USER_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        USER_TABLE_V_1,
        PASSWORD_CREDENTIALS_TABLE_V_1,
        PASSWORD_RESET_TOKEN_TABLE_V_1,
        PURCHASE_TABLE_V_1,
    ],
    migration: None,
}];

fn to_epoch(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn from_epoch(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open user database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = USER_VERSIONED_SCHEMAS.last().unwrap();
        if is_new_db {
            info!("Creating new user database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            let schema = USER_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown user database version {}", db_version))?;
            schema
                .validate(&conn)
                .context("User database schema validation failed")?;
            if schema.version < latest.version {
                bail!(
                    "User database version {} is older than {} and no migration is defined",
                    schema.version,
                    latest.version
                );
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let subscription: String = row.get("subscription")?;
        let role: String = row.get("role")?;
        let created: i64 = row.get("created")?;
        let id: i64 = row.get("id")?;

        Ok(User {
            id: id as usize,
            email: row.get("email")?,
            name: row.get("name")?,
            subscription: SubscriptionStatus::from_str(&subscription)
                .unwrap_or(SubscriptionStatus::Free),
            role: UserRole::from_str(&role).unwrap_or(UserRole::User),
            created: from_epoch(created),
        })
    }

    fn row_to_reset_token(row: &rusqlite::Row) -> rusqlite::Result<PasswordResetToken> {
        let id: i64 = row.get("id")?;
        let user_id: i64 = row.get("user_id")?;
        let expires_at: i64 = row.get("expires_at")?;
        let used: i64 = row.get("used")?;
        let created: i64 = row.get("created")?;
        Ok(PasswordResetToken {
            id: id as usize,
            user_id: user_id as usize,
            email: row.get("email")?,
            token: row.get("token")?,
            expires_at: from_epoch(expires_at),
            used: used != 0,
            created: from_epoch(created),
        })
    }

    fn row_to_purchase(row: &rusqlite::Row) -> rusqlite::Result<Purchase> {
        let status: String = row.get("status")?;
        let access_type: String = row.get("access_type")?;
        let user_id: i64 = row.get("user_id")?;
        let purchased_at: i64 = row.get("purchased_at")?;

        Ok(Purchase {
            id: row.get("id")?,
            user_id: user_id as usize,
            book_id: row.get("book_id")?,
            status: PurchaseStatus::from_str(&status).unwrap_or(PurchaseStatus::Pending),
            access_type: AccessKind::from_str(&access_type).unwrap_or(AccessKind::Purchased),
            purchased_at: from_epoch(purchased_at),
        })
    }
}

impl UserAccountStore for SqliteUserStore {
    fn create_user(&self, email: &str, name: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (email, name, subscription, role) VALUES (?1, ?2, 'free', 'user')",
            params![email, name],
        )?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, email, name, subscription, role, created FROM user WHERE id = ?1",
                params![user_id as i64],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, email, name, subscription, role, created FROM user WHERE email = ?1",
                params![email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn get_all_user_emails(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT email FROM user ORDER BY id")?;
        let emails = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(emails)
    }

    fn set_user_role(&self, user_id: usize, role: UserRole) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id as i64],
        )?;
        if updated == 0 {
            bail!("User {} does not exist", user_id);
        }
        Ok(())
    }

    fn set_subscription(&self, user_id: usize, status: SubscriptionStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET subscription = ?1 WHERE id = ?2",
            params![status.as_str(), user_id as i64],
        )?;
        if updated == 0 {
            bail!("User {} does not exist", user_id);
        }
        Ok(())
    }
}

impl UserCredentialsStore for SqliteUserStore {
    fn get_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>> {
        let conn = self.conn.lock().unwrap();
        let credentials = conn
            .query_row(
                "SELECT user_id, hash, hasher, created, last_used
                 FROM user_password_credentials WHERE user_id = ?1",
                params![user_id as i64],
                |row| {
                    let user_id: i64 = row.get("user_id")?;
                    let hasher: String = row.get("hasher")?;
                    let created: i64 = row.get("created")?;
                    let last_used: Option<i64> = row.get("last_used")?;
                    Ok((
                        user_id,
                        row.get::<_, String>("hash")?,
                        hasher,
                        created,
                        last_used,
                    ))
                },
            )
            .optional()?;

        match credentials {
            None => Ok(None),
            Some((user_id, hash, hasher, created, last_used)) => Ok(Some(PasswordCredentials {
                user_id: user_id as usize,
                hash,
                hasher: crate::user::StorynestHasher::from_str(&hasher)?,
                created: from_epoch(created),
                last_used: last_used.map(from_epoch),
            })),
        }
    }

    fn upsert_credentials(&self, credentials: PasswordCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_password_credentials (user_id, hash, hasher, created, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_id) DO UPDATE SET
                hash = excluded.hash,
                hasher = excluded.hasher,
                created = excluded.created,
                last_used = excluded.last_used",
            params![
                credentials.user_id as i64,
                credentials.hash,
                credentials.hasher.to_string(),
                to_epoch(credentials.created),
                credentials.last_used.map(to_epoch),
            ],
        )?;
        Ok(())
    }

    fn touch_credentials_last_used(&self, user_id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE user_password_credentials
             SET last_used = cast(strftime('%s','now') as int) WHERE user_id = ?1",
            params![user_id as i64],
        )?;
        Ok(())
    }
}

impl PasswordResetStore for SqliteUserStore {
    fn create_reset_token(&self, token: &PasswordResetToken) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO password_reset_token (user_id, email, token, expires_at, used)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                token.user_id as i64,
                token.email,
                token.token,
                to_epoch(token.expires_at),
            ],
        )?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_reset_token(&self, value: &str) -> Result<Option<PasswordResetToken>> {
        let conn = self.conn.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT id, user_id, email, token, expires_at, used, created
                 FROM password_reset_token WHERE token = ?1",
                params![value],
                Self::row_to_reset_token,
            )
            .optional()?;
        Ok(token)
    }

    fn get_latest_reset_token_for_user(
        &self,
        user_id: usize,
    ) -> Result<Option<PasswordResetToken>> {
        let conn = self.conn.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT id, user_id, email, token, expires_at, used, created
                 FROM password_reset_token WHERE user_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![user_id as i64],
                Self::row_to_reset_token,
            )
            .optional()?;
        Ok(token)
    }

    fn mark_reset_token_used(&self, id: usize) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE password_reset_token SET used = 1 WHERE id = ?1",
            params![id as i64],
        )?;
        if updated == 0 {
            bail!("Reset token {} does not exist", id);
        }
        Ok(())
    }

    fn prune_expired_reset_tokens(&self, now: SystemTime) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM password_reset_token WHERE expires_at < ?1",
            params![to_epoch(now)],
        )?;
        Ok(deleted)
    }
}

impl EntitlementStore for SqliteUserStore {
    fn get_purchase(&self, user_id: usize, book_id: &str) -> Result<Option<Purchase>> {
        let conn = self.conn.lock().unwrap();
        let purchase = conn
            .query_row(
                "SELECT id, user_id, book_id, status, access_type, purchased_at
                 FROM purchase WHERE user_id = ?1 AND book_id = ?2",
                params![user_id as i64, book_id],
                Self::row_to_purchase,
            )
            .optional()?;
        Ok(purchase)
    }

    fn record_purchase(&self, purchase: &Purchase) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO purchase (id, user_id, book_id, status, access_type, purchased_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                access_type = excluded.access_type",
            params![
                purchase.id,
                purchase.user_id as i64,
                purchase.book_id,
                purchase.status.as_str(),
                purchase.access_type.as_str(),
                to_epoch(purchase.purchased_at),
            ],
        )?;
        Ok(())
    }

    fn get_user_purchases(&self, user_id: usize) -> Result<Vec<Purchase>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, book_id, status, access_type, purchased_at
             FROM purchase WHERE user_id = ?1 ORDER BY purchased_at",
        )?;
        let purchases = stmt
            .query_map(params![user_id as i64], Self::row_to_purchase)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(purchases)
    }
}
