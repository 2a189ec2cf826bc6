use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Families of expiring token records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EmailVerification,
    Refresh,
    Revocation,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [
        TokenKind::EmailVerification,
        TokenKind::Refresh,
        TokenKind::Revocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::Refresh => "refresh",
            TokenKind::Revocation => "revocation",
        }
    }
}

/// Single-use email verification token record
#[derive(Debug, Clone, FromRow)]
pub struct EmailVerificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailVerificationToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Rotating refresh token record
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fields for inserting a verification or refresh token
#[derive(Debug, Clone)]
pub struct NewStoredToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Blacklist entry for a logged-out access token
#[derive(Debug, Clone, FromRow)]
pub struct RevokedTokenEntry {
    pub jti: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRevokedToken {
    pub jti: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Access + refresh credentials handed to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Rows removed by one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub verification_tokens: u64,
    pub refresh_tokens: u64,
    pub revoked_tokens: u64,
}

impl SweepReport {
    pub fn record(&mut self, kind: TokenKind, deleted: u64) {
        match kind {
            TokenKind::EmailVerification => self.verification_tokens += deleted,
            TokenKind::Refresh => self.refresh_tokens += deleted,
            TokenKind::Revocation => self.revoked_tokens += deleted,
        }
    }

    pub fn total(&self) -> u64 {
        self.verification_tokens + self.refresh_tokens + self.revoked_tokens
    }
}
