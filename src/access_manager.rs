use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::Pool;
use log::info;
use regex::Regex;
use std::error::Error;
use std::fmt;
use std::sync::OnceLock;

/// prefix of the `/start` payload carrying a verification token
pub const VERIFY_PREFIX: &str = "verify-";
pub const TOKEN_LENGTH: usize = 16;
/// how long an issued verification link stays redeemable
pub const TOKEN_LIFETIME_HOURS: i64 = 24;
/// an unredeemed token younger than this is handed out again instead of a new one
pub const TOKEN_REUSE_HOURS: i64 = 12;

#[derive(Debug)]
pub enum AccessManagerError {
    TokenNotFound,
    TokenAlreadyUsed,
    TokenExpired,
    TokenOwnerMismatch(i64), // telegram_user_id attempting redemption
    DatabaseError(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for AccessManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessManagerError::TokenNotFound => write!(f, "Verification token not found"),
            AccessManagerError::TokenAlreadyUsed => {
                write!(f, "Verification token was already redeemed")
            }
            AccessManagerError::TokenExpired => write!(f, "Verification token expired"),
            AccessManagerError::TokenOwnerMismatch(user_id) => {
                write!(f, "Verification token does not belong to user {}", user_id)
            }
            AccessManagerError::DatabaseError(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl Error for AccessManagerError {}

impl From<tokio_postgres::Error> for AccessManagerError {
    fn from(err: tokio_postgres::Error) -> Self {
        AccessManagerError::DatabaseError(Box::new(err))
    }
}

impl From<deadpool_postgres::PoolError> for AccessManagerError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        AccessManagerError::DatabaseError(Box::new(err))
    }
}

#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub telegram_user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// extracts the token from a `verify-<token>` start payload
pub fn parse_verify_payload(payload: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^{}([A-Za-z0-9]{{{}}})$", VERIFY_PREFIX, TOKEN_LENGTH))
            .expect("verify payload pattern is valid")
    });
    pattern
        .captures(payload.trim())
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

pub fn generate_token() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(TOKEN_LENGTH)
        .collect()
}

/// time-limited access grants earned by passing a shortened verification link
pub struct AccessManager {
    pool: Pool,
}

impl AccessManager {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn has_access(
        &self,
        telegram_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AccessManagerError> {
        Ok(self
            .access_expiry(telegram_user_id)
            .await?
            .is_some_and(|expires_at| expires_at > now))
    }

    pub async fn access_expiry(
        &self,
        telegram_user_id: i64,
    ) -> Result<Option<DateTime<Utc>>, AccessManagerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT expires_at FROM user_access WHERE telegram_user_id = $1",
                &[&telegram_user_id],
            )
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    /// returns the user's recent open token, or stores a fresh one-time token
    pub async fn issue_verification_token(
        &self,
        telegram_user_id: i64,
    ) -> Result<String, AccessManagerError> {
        let client = self.pool.get().await?;
        let reuse_after = Utc::now() - Duration::hours(TOKEN_REUSE_HOURS);
        let open = client
            .query_opt(
                "SELECT token FROM verification_tokens
                 WHERE telegram_user_id = $1 AND redeemed_at IS NULL AND created_at > $2
                 ORDER BY created_at DESC LIMIT 1",
                &[&telegram_user_id, &reuse_after],
            )
            .await?;
        if let Some(row) = open {
            return Ok(row.get(0));
        }

        let token = generate_token();
        client
            .execute(
                "INSERT INTO verification_tokens (token, telegram_user_id) VALUES ($1, $2)",
                &[&token, &telegram_user_id],
            )
            .await?;
        info!("Issued verification token for user {}", telegram_user_id);
        Ok(token)
    }

    /// consumes the token and grants access for `validity_hours` from `now`
    pub async fn redeem_verification_token(
        &self,
        telegram_user_id: i64,
        token: &str,
        validity_hours: i32,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AccessManagerError> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        let row = transaction
            .query_opt(
                "SELECT telegram_user_id, created_at, redeemed_at FROM verification_tokens
                 WHERE token = $1 FOR UPDATE",
                &[&token],
            )
            .await?
            .ok_or(AccessManagerError::TokenNotFound)?;

        let owner: i64 = row.get(0);
        let created_at: DateTime<Utc> = row.get(1);
        let redeemed_at: Option<DateTime<Utc>> = row.get(2);

        if owner != telegram_user_id {
            return Err(AccessManagerError::TokenOwnerMismatch(telegram_user_id));
        }
        if redeemed_at.is_some() {
            return Err(AccessManagerError::TokenAlreadyUsed);
        }
        if now - created_at > Duration::hours(TOKEN_LIFETIME_HOURS) {
            return Err(AccessManagerError::TokenExpired);
        }

        let expires_at = now + Duration::hours(validity_hours as i64);
        transaction
            .execute(
                "UPDATE verification_tokens SET redeemed_at = $2 WHERE token = $1",
                &[&token, &now],
            )
            .await?;
        transaction
            .execute(
                "INSERT INTO user_access (telegram_user_id, expires_at, renewed_at) VALUES ($1, $2, $3)
                 ON CONFLICT (telegram_user_id) DO UPDATE SET expires_at = EXCLUDED.expires_at, renewed_at = EXCLUDED.renewed_at",
                &[&telegram_user_id, &expires_at, &now],
            )
            .await?;
        transaction.commit().await?;

        info!(
            "Granted access to user {} until {}",
            telegram_user_id, expires_at
        );
        Ok(expires_at)
    }

    /// grants that have not expired yet, soonest expiry first
    pub async fn active_users(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessGrant>, AccessManagerError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT telegram_user_id, expires_at FROM user_access
                 WHERE expires_at > $1 ORDER BY expires_at",
                &[&now],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| AccessGrant {
                telegram_user_id: row.get(0),
                expires_at: row.get(1),
            })
            .collect())
    }

    pub async fn active_count(&self, now: DateTime<Utc>) -> Result<i64, AccessManagerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM user_access WHERE expires_at > $1",
                &[&now],
            )
            .await?;
        Ok(row.get(0))
    }

    /// returns whether the user had a grant to revoke
    pub async fn revoke_user(&self, telegram_user_id: i64) -> Result<bool, AccessManagerError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM user_access WHERE telegram_user_id = $1",
                &[&telegram_user_id],
            )
            .await?;
        info!("Revoked access for user {} ({} rows)", telegram_user_id, deleted);
        Ok(deleted > 0)
    }

    pub async fn revoke_all(&self) -> Result<u64, AccessManagerError> {
        let client = self.pool.get().await?;
        let deleted = client.execute("DELETE FROM user_access", &[]).await?;
        info!("Revoked all access grants ({} rows)", deleted);
        Ok(deleted)
    }

    /// drops expired grants and verification tokens past their lifetime
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AccessManagerError> {
        let client = self.pool.get().await?;
        let grants = client
            .execute("DELETE FROM user_access WHERE expires_at <= $1", &[&now])
            .await?;
        let cutoff = now - Duration::hours(TOKEN_LIFETIME_HOURS);
        let tokens = client
            .execute(
                "DELETE FROM verification_tokens WHERE created_at < $1 OR redeemed_at IS NOT NULL",
                &[&cutoff],
            )
            .await?;
        info!(
            "Pruned {} expired grants and {} stale verification tokens",
            grants, tokens
        );
        Ok(grants + tokens)
    }
}
