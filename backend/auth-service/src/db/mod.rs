/// Credential persistence for the auth service
///
/// [`CredentialStore`] is the only seam between account/token logic and storage.
/// Every method is a single atomic operation; the conditional ones
/// (`consume_verification_token`, `mark_refresh_token_used`,
/// `insert_blacklist_entry`) report whether this caller won.
pub mod accounts;
pub mod auth_logs;
pub mod memory;
pub mod postgres;
pub mod roles;
pub mod token_revocation;
pub mod tokens;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    Account, AuthAttemptLog, EmailVerificationToken, NewAccount, NewAuthAttempt, NewRevokedToken,
    NewStoredToken, RefreshToken, Role, TokenKind,
};

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn find_account_by_id(&self, account_id: Uuid) -> StoreResult<Option<Account>>;

    /// `StoreError::Conflict` if the email is taken
    async fn create_account(&self, account: NewAccount) -> StoreResult<Account>;

    /// Fetch or lazily create a role by name
    async fn ensure_role(&self, name: &str) -> StoreResult<Role>;

    async fn update_verification_flag(&self, account_id: Uuid, verified: bool) -> StoreResult<()>;

    async fn update_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn link_federated_identity(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
    ) -> StoreResult<()>;

    /// Hand an unverified account to a federated identity in one step: drop
    /// the local password, set the verification flag, link the provider if
    /// none is linked and delete the account's verification and refresh
    /// tokens. `Ok(None)` if the account is already verified.
    async fn claim_unverified_account(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>>;

    async fn create_verification_token(
        &self,
        token: NewStoredToken,
    ) -> StoreResult<EmailVerificationToken>;

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<EmailVerificationToken>>;

    /// Atomically mark the token used and set its account's verification flag.
    /// `Ok(false)` if the token was already used or expired at `now`.
    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn create_refresh_token(&self, token: NewStoredToken) -> StoreResult<RefreshToken>;

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>>;

    /// `Ok(false)` if the token was already used or expired at `now`
    async fn mark_refresh_token_used(&self, token_id: Uuid, now: DateTime<Utc>)
        -> StoreResult<bool>;

    /// `Ok(false)` if the jti was already blacklisted
    async fn insert_blacklist_entry(&self, entry: NewRevokedToken) -> StoreResult<bool>;

    async fn is_blacklisted(&self, jti: &str) -> StoreResult<bool>;

    async fn append_auth_log(&self, attempt: NewAuthAttempt) -> StoreResult<AuthAttemptLog>;

    /// Delete records of `kind` whose expiry is at or before `now`
    async fn delete_expired(&self, kind: TokenKind, now: DateTime<Utc>) -> StoreResult<u64>;
}
