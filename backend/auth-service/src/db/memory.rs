/// In-process credential store
///
/// Every operation runs under one mutex, which makes each call atomic with
/// respect to every other. The lock is never held across an `.await`.
/// Used by tests and by local development when no `DATABASE_URL` is set.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::CredentialStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Account, AuthAttemptLog, EmailVerificationToken, NewAccount, NewAuthAttempt, NewRevokedToken,
    NewStoredToken, RefreshToken, RevokedTokenEntry, Role, TokenKind,
};

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    roles: HashMap<String, Role>,
    verification_tokens: HashMap<Uuid, EmailVerificationToken>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    revoked: HashMap<String, RevokedTokenEntry>,
    auth_logs: Vec<AuthAttemptLog>,
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<MemoryState>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    /// Snapshot of the audit log, oldest first
    pub fn auth_logs(&self) -> Vec<AuthAttemptLog> {
        self.state().map(|s| s.auth_logs.clone()).unwrap_or_default()
    }

    pub fn account_count(&self) -> usize {
        self.state().map(|s| s.accounts.len()).unwrap_or_default()
    }

    /// Row counts as `(verification, refresh, revoked)`
    pub fn token_counts(&self) -> (usize, usize, usize) {
        self.state()
            .map(|s| {
                (
                    s.verification_tokens.len(),
                    s.refresh_tokens.len(),
                    s.revoked.len(),
                )
            })
            .unwrap_or_default()
    }

    /// Flip the active flag (administrative action, no public operation exists)
    pub fn set_account_active(&self, account_id: Uuid, active: bool) -> StoreResult<()> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound("account"))?;
        account.is_active = active;
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let state = self.state()?;
        Ok(state.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_id(&self, account_id: Uuid) -> StoreResult<Option<Account>> {
        let state = self.state()?;
        Ok(state.accounts.get(&account_id).cloned())
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        if !account.has_credential() {
            return Err(StoreError::Invalid(
                "account needs a password hash or a federated identity".to_string(),
            ));
        }

        let mut state = self.state()?;
        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                account.email
            )));
        }
        let role = state
            .roles
            .values()
            .find(|r| r.id == account.role_id)
            .map(|r| r.name.clone())
            .ok_or(StoreError::NotFound("role"))?;

        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            email: account.email,
            name: account.name,
            password_hash: account.password_hash,
            email_verified: account.email_verified,
            is_active: true,
            role_id: account.role_id,
            role,
            oauth_provider: account.oauth_provider,
            oauth_subject: account.oauth_subject,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn ensure_role(&self, name: &str) -> StoreResult<Role> {
        let mut state = self.state()?;
        let role = state
            .roles
            .entry(name.to_string())
            .or_insert_with(|| Role {
                id: Uuid::new_v4(),
                name: name.to_string(),
                created_at: Utc::now(),
            });
        Ok(role.clone())
    }

    async fn update_verification_flag(&self, account_id: Uuid, verified: bool) -> StoreResult<()> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound("account"))?;
        account.email_verified = verified;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound("account"))?;
        account.last_login_at = Some(at);
        account.updated_at = at;
        Ok(())
    }

    async fn link_federated_identity(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound("account"))?;
        account.oauth_provider = Some(provider.to_string());
        if let Some(subject) = subject {
            account.oauth_subject = Some(subject.to_string());
        }
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_unverified_account(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        let mut state = self.state()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::NotFound("account"))?;
        if account.email_verified {
            return Ok(None);
        }

        account.password_hash = None;
        account.email_verified = true;
        if account.oauth_provider.is_none() {
            account.oauth_provider = Some(provider.to_string());
            account.oauth_subject = subject.map(str::to_string);
        }
        account.updated_at = now;
        let claimed = account.clone();

        state
            .verification_tokens
            .retain(|_, t| t.user_id != account_id);
        state.refresh_tokens.retain(|_, t| t.user_id != account_id);
        Ok(Some(claimed))
    }

    async fn create_verification_token(
        &self,
        token: NewStoredToken,
    ) -> StoreResult<EmailVerificationToken> {
        let mut state = self.state()?;
        if state
            .verification_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(StoreError::Conflict("verification token hash".to_string()));
        }
        let record = EmailVerificationToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            used: false,
            used_at: None,
            created_at: Utc::now(),
        };
        state.verification_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<EmailVerificationToken>> {
        let state = self.state()?;
        Ok(state
            .verification_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        let user_id = match state.verification_tokens.get(&token_id) {
            Some(t) if !t.used && t.expires_at > now => t.user_id,
            _ => return Ok(false),
        };
        if !state.accounts.contains_key(&user_id) {
            return Err(StoreError::NotFound("account"));
        }

        if let Some(token) = state.verification_tokens.get_mut(&token_id) {
            token.used = true;
            token.used_at = Some(now);
        }
        if let Some(account) = state.accounts.get_mut(&user_id) {
            account.email_verified = true;
            account.updated_at = now;
        }
        Ok(true)
    }

    async fn create_refresh_token(&self, token: NewStoredToken) -> StoreResult<RefreshToken> {
        let mut state = self.state()?;
        if state
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(StoreError::Conflict("refresh token hash".to_string()));
        }
        let record = RefreshToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            used: false,
            used_at: None,
            created_at: Utc::now(),
        };
        state.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        let state = self.state()?;
        Ok(state
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn mark_refresh_token_used(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state()?;
        match state.refresh_tokens.get_mut(&token_id) {
            Some(token) if !token.used && token.expires_at > now => {
                token.used = true;
                token.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_blacklist_entry(&self, entry: NewRevokedToken) -> StoreResult<bool> {
        let mut state = self.state()?;
        if state.revoked.contains_key(&entry.jti) {
            return Ok(false);
        }
        state.revoked.insert(
            entry.jti.clone(),
            RevokedTokenEntry {
                jti: entry.jti,
                user_id: entry.user_id,
                expires_at: entry.expires_at,
                revoked_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn is_blacklisted(&self, jti: &str) -> StoreResult<bool> {
        let state = self.state()?;
        Ok(state.revoked.contains_key(jti))
    }

    async fn append_auth_log(&self, attempt: NewAuthAttempt) -> StoreResult<AuthAttemptLog> {
        let mut state = self.state()?;
        let log = AuthAttemptLog {
            id: Uuid::new_v4(),
            user_id: attempt.user_id,
            action: attempt.action.as_str().to_string(),
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            success: attempt.success,
            failure_reason: attempt.failure_reason,
            created_at: Utc::now(),
        };
        state.auth_logs.push(log.clone());
        Ok(log)
    }

    async fn delete_expired(&self, kind: TokenKind, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state()?;
        let removed = match kind {
            TokenKind::EmailVerification => {
                let before = state.verification_tokens.len();
                state.verification_tokens.retain(|_, t| t.expires_at > now);
                before - state.verification_tokens.len()
            }
            TokenKind::Refresh => {
                let before = state.refresh_tokens.len();
                state.refresh_tokens.retain(|_, t| t.expires_at > now);
                before - state.refresh_tokens.len()
            }
            TokenKind::Revocation => {
                let before = state.revoked.len();
                state.revoked.retain(|_, e| e.expires_at > now);
                before - state.revoked.len()
            }
        };
        Ok(removed as u64)
    }
}
