use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{accounts, auth_logs, roles, token_revocation, tokens, CredentialStore};
use crate::error::StoreResult;
use crate::models::{
    Account, AuthAttemptLog, EmailVerificationToken, NewAccount, NewAuthAttempt, NewRevokedToken,
    NewStoredToken, RefreshToken, Role, TokenKind,
};

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        accounts::find_by_email(&self.pool, email).await
    }

    async fn find_account_by_id(&self, account_id: Uuid) -> StoreResult<Option<Account>> {
        accounts::find_by_id(&self.pool, account_id).await
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        accounts::create_account(&self.pool, &account).await
    }

    async fn ensure_role(&self, name: &str) -> StoreResult<Role> {
        roles::ensure_role(&self.pool, name).await
    }

    async fn update_verification_flag(&self, account_id: Uuid, verified: bool) -> StoreResult<()> {
        accounts::update_verification_flag(&self.pool, account_id, verified).await
    }

    async fn update_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        accounts::update_last_login(&self.pool, account_id, at).await
    }

    async fn link_federated_identity(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
    ) -> StoreResult<()> {
        accounts::link_federated_identity(&self.pool, account_id, provider, subject).await
    }

    async fn claim_unverified_account(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        accounts::claim_unverified_account(&self.pool, account_id, provider, subject, now).await
    }

    async fn create_verification_token(
        &self,
        token: NewStoredToken,
    ) -> StoreResult<EmailVerificationToken> {
        tokens::create_verification_token(&self.pool, &token).await
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<EmailVerificationToken>> {
        tokens::find_verification_token(&self.pool, token_hash).await
    }

    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        tokens::consume_verification_token(&self.pool, token_id, now).await
    }

    async fn create_refresh_token(&self, token: NewStoredToken) -> StoreResult<RefreshToken> {
        tokens::create_refresh_token(&self.pool, &token).await
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        tokens::find_refresh_token(&self.pool, token_hash).await
    }

    async fn mark_refresh_token_used(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        tokens::mark_refresh_token_used(&self.pool, token_id, now).await
    }

    async fn insert_blacklist_entry(&self, entry: NewRevokedToken) -> StoreResult<bool> {
        token_revocation::revoke_token(&self.pool, &entry).await
    }

    async fn is_blacklisted(&self, jti: &str) -> StoreResult<bool> {
        token_revocation::is_jti_revoked(&self.pool, jti).await
    }

    async fn append_auth_log(&self, attempt: NewAuthAttempt) -> StoreResult<AuthAttemptLog> {
        auth_logs::append(&self.pool, &attempt).await
    }

    async fn delete_expired(&self, kind: TokenKind, now: DateTime<Utc>) -> StoreResult<u64> {
        match kind {
            TokenKind::EmailVerification => {
                tokens::cleanup_expired_verification_tokens(&self.pool, now).await
            }
            TokenKind::Refresh => tokens::cleanup_expired_refresh_tokens(&self.pool, now).await,
            TokenKind::Revocation => {
                token_revocation::cleanup_expired_revocations(&self.pool, now).await
            }
        }
    }
}
