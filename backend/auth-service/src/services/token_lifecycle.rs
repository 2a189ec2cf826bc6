/// Token lifecycle engine
///
/// Owns the four token protocols the service hands out:
/// - **Access tokens**: signed JWTs, validated statelessly plus a blacklist lookup
/// - **Refresh tokens**: opaque, single-use, rotated on every exchange
/// - **Email verification tokens**: opaque, single-use
/// - **Revocation entries**: blacklisted access-token `jti`s written on logout
///
/// Opaque tokens are returned to the caller once and only their SHA-256
/// digest is persisted.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TokenSettings;
use crate::db::CredentialStore;
use crate::error::{AuthError, Result};
use crate::models::{NewRevokedToken, NewStoredToken, SweepReport, TokenKind, TokenPair};
use crate::security::{generate_opaque_token, sha256_hex, AccessClaims, JwtError, JwtKeys};

/// `token_type` reported alongside every issued pair
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

#[derive(Clone)]
pub struct TokenLifecycle {
    store: Arc<dyn CredentialStore>,
    keys: JwtKeys,
    settings: TokenSettings,
}

impl TokenLifecycle {
    pub fn new(store: Arc<dyn CredentialStore>, keys: JwtKeys, settings: TokenSettings) -> Self {
        Self {
            store,
            keys,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Sign a fresh access token for `account_id`
    pub fn issue_access_token(&self, account_id: Uuid) -> Result<String> {
        let issued = self
            .keys
            .issue_access_token(account_id, self.settings.access_ttl())?;
        Ok(issued.token)
    }

    /// Validate an access token and check it has not been logged out
    ///
    /// ## Errors
    ///
    /// - `InvalidToken` for a bad signature, malformed token or wrong claims
    /// - `Expired` once `exp` has passed
    /// - `Revoked` if the `jti` is blacklisted
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims> {
        let claims = self.decode(token)?;

        if self.store.is_blacklisted(&claims.jti).await? {
            warn!(jti = %claims.jti, sub = %claims.sub, "rejected revoked access token");
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }

    /// Account named by a verified access token, ignoring the blacklist
    pub fn token_subject(&self, token: &str) -> Result<Uuid> {
        Ok(self.decode(token)?.subject()?)
    }

    /// Persist a new refresh token and return the raw value
    pub async fn issue_refresh_token(&self, account_id: Uuid) -> Result<String> {
        let raw = generate_opaque_token();
        self.store
            .create_refresh_token(NewStoredToken {
                user_id: account_id,
                token_hash: sha256_hex(&raw),
                expires_at: Utc::now() + self.settings.refresh_ttl(),
            })
            .await?;
        Ok(raw)
    }

    /// Issue an access token and a refresh token together
    pub async fn issue_token_pair(&self, account_id: Uuid) -> Result<TokenPair> {
        let access_token = self.issue_access_token(account_id)?;
        let refresh_token = self.issue_refresh_token(account_id).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: BEARER_TOKEN_TYPE.to_string(),
            expires_in: self.settings.access_ttl_secs,
        })
    }

    /// Spend a refresh token, returning the account it belongs to
    ///
    /// The caller issues the replacement pair; this only retires the old token.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if no token has this value
    /// - `AlreadyUsed` if it was exchanged before, including by a concurrent caller
    /// - `Expired` if it is past its expiry
    pub async fn consume_refresh_token(&self, raw: &str) -> Result<Uuid> {
        let token_hash = sha256_hex(raw);
        let record = self
            .store
            .find_refresh_token(&token_hash)
            .await?
            .ok_or(AuthError::NotFound("refresh token"))?;

        let now = Utc::now();
        if record.used {
            warn!(user_id = %record.user_id, "refresh token reuse detected");
            return Err(AuthError::AlreadyUsed);
        }
        if record.is_expired_at(now) {
            return Err(AuthError::Expired);
        }

        if !self.store.mark_refresh_token_used(record.id, now).await? {
            // Lost the race against another exchange or the expiry boundary
            return Err(if record.is_expired_at(Utc::now()) {
                AuthError::Expired
            } else {
                AuthError::AlreadyUsed
            });
        }

        debug!(user_id = %record.user_id, "refresh token rotated");
        Ok(record.user_id)
    }

    /// Persist a new email verification token and return the raw value
    pub async fn issue_verification_token(&self, account_id: Uuid) -> Result<String> {
        let raw = generate_opaque_token();
        self.store
            .create_verification_token(NewStoredToken {
                user_id: account_id,
                token_hash: sha256_hex(&raw),
                expires_at: Utc::now() + self.settings.verification_ttl(),
            })
            .await?;
        Ok(raw)
    }

    /// Spend a verification token and mark its account verified in one step
    ///
    /// ## Errors
    ///
    /// Same classification as [`Self::consume_refresh_token`].
    pub async fn consume_verification_token(&self, raw: &str) -> Result<Uuid> {
        let token_hash = sha256_hex(raw);
        let record = self
            .store
            .find_verification_token(&token_hash)
            .await?
            .ok_or(AuthError::NotFound("verification token"))?;

        let now = Utc::now();
        if record.used {
            return Err(AuthError::AlreadyUsed);
        }
        if record.is_expired_at(now) {
            return Err(AuthError::Expired);
        }

        if !self.store.consume_verification_token(record.id, now).await? {
            return Err(if record.is_expired_at(Utc::now()) {
                AuthError::Expired
            } else {
                AuthError::AlreadyUsed
            });
        }

        Ok(record.user_id)
    }

    /// Blacklist an access token until it would have expired anyway
    ///
    /// Idempotent: revoking the same token twice succeeds both times.
    ///
    /// ## Errors
    ///
    /// - `InvalidToken` if the token does not verify or its subject is not `account_id`
    /// - `Expired` if it already expired
    pub async fn revoke_access_token(&self, token: &str, account_id: Uuid) -> Result<()> {
        let claims = self.decode(token)?;
        let subject = claims.subject()?;
        if subject != account_id {
            warn!(sub = %subject, account_id = %account_id, "logout with token of another account");
            return Err(AuthError::InvalidToken);
        }

        let inserted = self
            .store
            .insert_blacklist_entry(NewRevokedToken {
                jti: claims.jti.clone(),
                user_id: subject,
                expires_at: claims.expires_at(),
            })
            .await?;

        if inserted {
            info!(jti = %claims.jti, user_id = %subject, "access token revoked");
        } else {
            debug!(jti = %claims.jti, "access token already revoked");
        }
        Ok(())
    }

    /// Delete every token record whose expiry is at or before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for kind in TokenKind::ALL {
            let deleted = self.store.delete_expired(kind, now).await?;
            report.record(kind, deleted);
        }
        Ok(report)
    }

    fn decode(&self, token: &str) -> Result<AccessClaims> {
        self.keys.decode_access_token(token).map_err(|e| {
            match &e {
                JwtError::Expired => debug!("rejected expired access token"),
                JwtError::Invalid(reason) => warn!(reason = %reason, "rejected invalid access token"),
                _ => {}
            }
            AuthError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCredentialStore;
    use crate::models::{NewAccount, DEFAULT_ROLE};

    const SECRET: &[u8] = b"token-lifecycle-test-secret-000000";

    async fn setup() -> (TokenLifecycle, Arc<InMemoryCredentialStore>, Uuid) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let role = store.ensure_role(DEFAULT_ROLE).await.unwrap();
        let account = store
            .create_account(NewAccount::with_password(
                "t@x.com".into(),
                "T X".into(),
                "$argon2id$stub".into(),
                &role,
            ))
            .await
            .unwrap();
        let engine = TokenLifecycle::new(
            store.clone(),
            JwtKeys::from_secret(SECRET).unwrap(),
            TokenSettings::default(),
        );
        (engine, store, account.id)
    }

    #[tokio::test]
    async fn test_token_pair_shape() {
        let (engine, _, account_id) = setup().await;
        let pair = engine.issue_token_pair(account_id).await.unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);
        assert_eq!(pair.refresh_token.len(), 64);

        let claims = engine.validate_access_token(&pair.access_token).await.unwrap();
        assert_eq!(claims.subject().unwrap(), account_id);
        assert_eq!(claims.jti.len(), 36);
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use() {
        let (engine, _, account_id) = setup().await;
        let raw = engine.issue_refresh_token(account_id).await.unwrap();

        assert_eq!(engine.consume_refresh_token(&raw).await.unwrap(), account_id);
        assert!(matches!(
            engine.consume_refresh_token(&raw).await,
            Err(AuthError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_not_found() {
        let (engine, _, _) = setup().await;
        assert!(matches!(
            engine.consume_refresh_token("deadbeef").await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_rejected() {
        let (_, store, account_id) = setup().await;
        let engine = TokenLifecycle::new(
            store.clone(),
            JwtKeys::from_secret(SECRET).unwrap(),
            TokenSettings {
                refresh_ttl_secs: -1,
                ..TokenSettings::default()
            },
        );
        let raw = engine.issue_refresh_token(account_id).await.unwrap();

        assert!(matches!(
            engine.consume_refresh_token(&raw).await,
            Err(AuthError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let (engine, _, account_id) = setup().await;
        let raw = engine.issue_refresh_token(account_id).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let raw = raw.clone();
                tokio::spawn(async move { engine.consume_refresh_token(&raw).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert!(matches!(err, AuthError::AlreadyUsed)),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_verification_token_flips_flag_once() {
        let (engine, store, account_id) = setup().await;
        let raw = engine.issue_verification_token(account_id).await.unwrap();

        assert_eq!(
            engine.consume_verification_token(&raw).await.unwrap(),
            account_id
        );
        let account = store.find_account_by_id(account_id).await.unwrap().unwrap();
        assert!(account.email_verified);

        assert!(matches!(
            engine.consume_verification_token(&raw).await,
            Err(AuthError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_revoked_access_token_fails_validation() {
        let (engine, _, account_id) = setup().await;
        let token = engine.issue_access_token(account_id).unwrap();

        engine.revoke_access_token(&token, account_id).await.unwrap();
        engine.revoke_access_token(&token, account_id).await.unwrap();

        assert!(matches!(
            engine.validate_access_token(&token).await,
            Err(AuthError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_revoke_rejects_foreign_token() {
        let (engine, _, account_id) = setup().await;
        let token = engine.issue_access_token(account_id).unwrap();

        assert!(matches!(
            engine.revoke_access_token(&token, Uuid::new_v4()).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            engine.revoke_access_token("not.a.jwt", account_id).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (_, store, account_id) = setup().await;
        let engine = TokenLifecycle::new(
            store.clone(),
            JwtKeys::from_secret(SECRET).unwrap(),
            TokenSettings {
                refresh_ttl_secs: -1,
                verification_ttl_secs: -1,
                ..TokenSettings::default()
            },
        );
        engine.issue_refresh_token(account_id).await.unwrap();
        engine.issue_verification_token(account_id).await.unwrap();

        let first = engine.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(first.refresh_tokens, 1);
        assert_eq!(first.verification_tokens, 1);

        let second = engine.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(second.total(), 0);
    }
}
