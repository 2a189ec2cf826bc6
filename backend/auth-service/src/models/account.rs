use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::oauth::FederatedProfile;
use super::tokens::TokenPair;

/// Role assigned to every new account
pub const DEFAULT_ROLE: &str = "user";

/// Account model - core identity entity
///
/// `role` is the joined role name; `role_id` is the stored reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub role_id: Uuid,
    pub role: String,
    pub oauth_provider: Option<String>,
    pub oauth_subject: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account can log in with a password at all
    pub fn has_local_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Whether a federated identity is linked
    pub fn is_federated(&self) -> bool {
        self.oauth_provider.is_some()
    }
}

/// Fields required to insert an account
///
/// Only constructible with a password hash or a federated identity, never neither.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub role_id: Uuid,
    pub oauth_provider: Option<String>,
    pub oauth_subject: Option<String>,
}

impl NewAccount {
    /// Local account awaiting email verification
    pub fn with_password(email: String, name: String, password_hash: String, role: &Role) -> Self {
        Self {
            email,
            name,
            password_hash: Some(password_hash),
            email_verified: false,
            role_id: role.id,
            oauth_provider: None,
            oauth_subject: None,
        }
    }

    /// Password-less account vouched for by an identity provider
    pub fn federated(profile: &FederatedProfile, role: &Role) -> Self {
        Self {
            email: profile.email.clone(),
            name: profile.name.clone(),
            password_hash: None,
            email_verified: true,
            role_id: role.id,
            oauth_provider: Some(profile.provider.clone()),
            oauth_subject: profile.subject.clone(),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.password_hash.is_some() || self.oauth_provider.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Outward projection of an account (never carries the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub role: String,
    pub oauth_provider: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for PublicProfile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            email_verified: account.email_verified,
            is_active: account.is_active,
            role: account.role.clone(),
            oauth_provider: account.oauth_provider.clone(),
            last_login_at: account.last_login_at,
            created_at: account.created_at,
        }
    }
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Email verification request (also bound from `?token=`)
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email)]
    pub email: String,
}

/// Result of a successful registration
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub account: PublicProfile,
    pub message: String,
}

/// Credentials plus the profile they were issued for
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: PublicProfile,
}

/// Result of a federated login
#[derive(Debug, Clone, Serialize)]
pub struct FederatedLoginOutcome {
    #[serde(flatten)]
    pub session: AuthSession,
    pub is_new_account: bool,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
