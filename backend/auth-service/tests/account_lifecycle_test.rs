//! End-to-end account and token lifecycle tests against the in-memory store
//!
//! Run with: cargo test -p auth-service --test account_lifecycle_test

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use auth_service::{
    config::TokenSettings,
    db::{CredentialStore, InMemoryCredentialStore},
    error::{AuthError, StoreError, StoreResult},
    models::{
        Account, AuthAttemptLog, ClientContext, EmailVerificationToken, FederatedClaims,
        FederatedProfile, LoginRequest, NewAccount, NewAuthAttempt, NewRevokedToken,
        NewStoredToken, RefreshToken, RegisterRequest, Role, TokenKind,
    },
    security::JwtKeys,
    services::{run_sweep, AccountService, NotificationSink, TokenLifecycle},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use tokio::sync::{mpsc, Mutex};
use tokio_test::{assert_err, assert_ok};

/// Captures every delivered verification token
struct RecordingSink {
    tx: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_verification_link(&self, to_email: &str, token: &str) -> auth_service::Result<()> {
        let _ = self.tx.send((to_email.to_string(), token.to_string()));
        Ok(())
    }
}

/// In-memory store whose verification-token and audit writes can be made to fail
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryCredentialStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_email(email).await
    }

    async fn find_account_by_id(&self, account_id: Uuid) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_id(account_id).await
    }

    async fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.inner.create_account(account).await
    }

    async fn ensure_role(&self, name: &str) -> StoreResult<Role> {
        self.inner.ensure_role(name).await
    }

    async fn update_verification_flag(&self, account_id: Uuid, verified: bool) -> StoreResult<()> {
        self.inner.update_verification_flag(account_id, verified).await
    }

    async fn update_last_login(&self, account_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.update_last_login(account_id, at).await
    }

    async fn link_federated_identity(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
    ) -> StoreResult<()> {
        self.inner
            .link_federated_identity(account_id, provider, subject)
            .await
    }

    async fn claim_unverified_account(
        &self,
        account_id: Uuid,
        provider: &str,
        subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Account>> {
        self.inner
            .claim_unverified_account(account_id, provider, subject, now)
            .await
    }

    async fn create_verification_token(
        &self,
        token: NewStoredToken,
    ) -> StoreResult<EmailVerificationToken> {
        self.check()?;
        self.inner.create_verification_token(token).await
    }

    async fn find_verification_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<EmailVerificationToken>> {
        self.inner.find_verification_token(token_hash).await
    }

    async fn consume_verification_token(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.consume_verification_token(token_id, now).await
    }

    async fn create_refresh_token(&self, token: NewStoredToken) -> StoreResult<RefreshToken> {
        self.inner.create_refresh_token(token).await
    }

    async fn find_refresh_token(&self, token_hash: &str) -> StoreResult<Option<RefreshToken>> {
        self.inner.find_refresh_token(token_hash).await
    }

    async fn mark_refresh_token_used(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.mark_refresh_token_used(token_id, now).await
    }

    async fn insert_blacklist_entry(&self, entry: NewRevokedToken) -> StoreResult<bool> {
        self.inner.insert_blacklist_entry(entry).await
    }

    async fn is_blacklisted(&self, jti: &str) -> StoreResult<bool> {
        self.inner.is_blacklisted(jti).await
    }

    async fn append_auth_log(&self, attempt: NewAuthAttempt) -> StoreResult<AuthAttemptLog> {
        self.check()?;
        self.inner.append_auth_log(attempt).await
    }

    async fn delete_expired(&self, kind: TokenKind, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.delete_expired(kind, now).await
    }
}

struct Harness {
    service: AccountService,
    store: Arc<InMemoryCredentialStore>,
    outbox: Mutex<mpsc::UnboundedReceiver<(String, String)>>,
    ctx: ClientContext,
}

impl Harness {
    fn with_settings(settings: TokenSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::new(InMemoryCredentialStore::new());
        let keys = JwtKeys::from_secret(b"integration-test-secret-0123456789").unwrap();
        let tokens = TokenLifecycle::new(store.clone(), keys, settings);
        let service = AccountService::new(store.clone(), tokens, Arc::new(RecordingSink { tx }));

        Self {
            service,
            store,
            outbox: Mutex::new(rx),
            ctx: ClientContext::new(Some("192.0.2.10".into()), Some("integration-test".into())),
        }
    }

    fn new() -> Self {
        Self::with_settings(TokenSettings::default())
    }

    async fn register(&self, email: &str) -> auth_service::Result<()> {
        self.service
            .register(
                RegisterRequest {
                    email: email.to_string(),
                    password: "pw123456".to_string(),
                    first_name: "A".to_string(),
                    last_name: "B".to_string(),
                },
                &self.ctx,
            )
            .await
            .map(|_| ())
    }

    async fn next_token(&self) -> String {
        self.outbox.lock().await.recv().await.unwrap().1
    }

    async fn login(&self, email: &str) -> auth_service::Result<auth_service::models::AuthSession> {
        self.service
            .login(
                LoginRequest {
                    email: email.to_string(),
                    password: "pw123456".to_string(),
                },
                &self.ctx,
            )
            .await
    }

    async fn verified_session(&self, email: &str) -> auth_service::models::AuthSession {
        self.register(email).await.unwrap();
        let token = self.next_token().await;
        self.service.verify_email(&token).await.unwrap();
        self.login(email).await.unwrap()
    }
}

#[tokio::test]
async fn full_registration_scenario() {
    let h = Harness::new();

    h.register("a@x.com").await.unwrap();
    let (recipient, token) = h.outbox.lock().await.recv().await.unwrap();
    assert_eq!(recipient, "a@x.com");

    assert!(matches!(h.login("a@x.com").await, Err(AuthError::NotVerified)));

    assert_ok!(h.service.verify_email(&token).await);
    let first = assert_ok!(h.login("a@x.com").await);
    assert!(first.user.last_login_at.is_some());

    let second = assert_ok!(
        h.service
            .refresh_access_token(&first.tokens.refresh_token, &h.ctx)
            .await
    );
    assert_ne!(second.tokens.refresh_token, first.tokens.refresh_token);
    assert_ne!(second.tokens.access_token, first.tokens.access_token);

    assert!(matches!(
        h.service
            .refresh_access_token(&first.tokens.refresh_token, &h.ctx)
            .await,
        Err(AuthError::AlreadyUsed)
    ));

    let profile = h.service.get_profile(first.user.id).await.unwrap();
    assert_eq!(profile.email, "a@x.com");
    assert_eq!(profile.name, "A B");
}

#[tokio::test]
async fn duplicate_registration_yields_one_conflict() {
    let h = Harness::new();

    h.register("dup@x.com").await.unwrap();
    assert!(matches!(
        h.register("DUP@x.com").await,
        Err(AuthError::Conflict)
    ));
    assert_eq!(h.store.account_count(), 1);
}

#[tokio::test]
async fn concurrent_registration_creates_exactly_one_account() {
    let h = Arc::new(Harness::new());

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.register("race@x.com").await })
        })
        .collect();

    let mut created = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(()) => created += 1,
            Err(err) => assert!(matches!(err, AuthError::Conflict)),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.store.account_count(), 1);
}

#[tokio::test]
async fn rotated_refresh_token_fails_every_later_exchange() {
    let h = Harness::new();
    let session = h.verified_session("rot@x.com").await;

    h.service
        .refresh_access_token(&session.tokens.refresh_token, &h.ctx)
        .await
        .unwrap();

    for _ in 0..3 {
        assert!(matches!(
            h.service
                .refresh_access_token(&session.tokens.refresh_token, &h.ctx)
                .await,
            Err(AuthError::AlreadyUsed)
        ));
    }
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let h = Harness::new();
    let session = h.verified_session("out@x.com").await;
    let access = &session.tokens.access_token;

    h.service.authenticate(access).await.unwrap();
    h.service
        .logout(access, session.user.id, &h.ctx)
        .await
        .unwrap();
    // Idempotent
    h.service
        .logout(access, session.user.id, &h.ctx)
        .await
        .unwrap();

    assert!(matches!(
        h.service.authenticate(access).await,
        Err(AuthError::Revoked)
    ));

    let logouts = h
        .store
        .auth_logs()
        .into_iter()
        .filter(|log| log.action == "logout" && log.success)
        .count();
    assert_eq!(logouts, 2);
}

#[tokio::test]
async fn verify_email_twice_reports_already_used() {
    let h = Harness::new();
    h.register("v@x.com").await.unwrap();
    let token = h.next_token().await;

    let profile = h.service.verify_email(&token).await.unwrap();
    assert!(profile.email_verified);

    assert!(matches!(
        h.service.verify_email(&token).await,
        Err(AuthError::AlreadyUsed)
    ));
    let account = h.store.find_account_by_email("v@x.com").await.unwrap().unwrap();
    assert!(account.email_verified);

    let err = assert_err!(h.service.verify_email("no-such-token").await);
    assert!(matches!(err, AuthError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_verification_has_exactly_one_winner() {
    let h = Arc::new(Harness::new());
    h.register("both@x.com").await.unwrap();
    let token = h.next_token().await;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            let token = token.clone();
            tokio::spawn(async move { h.service.verify_email(&token).await })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(profile) => {
                assert!(profile.email_verified);
                winners += 1;
            }
            Err(err) => assert!(matches!(err, AuthError::AlreadyUsed)),
        }
    }
    assert_eq!(winners, 1);

    let account = h
        .store
        .find_account_by_email("both@x.com")
        .await
        .unwrap()
        .unwrap();
    assert!(account.email_verified);
    h.login("both@x.com").await.unwrap();
}

#[tokio::test]
async fn registration_succeeds_once_the_account_is_stored() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = Arc::new(FlakyStore::default());
    let keys = JwtKeys::from_secret(b"integration-test-secret-0123456789").unwrap();
    let tokens = TokenLifecycle::new(store.clone(), keys, TokenSettings::default());
    let service = AccountService::new(store.clone(), tokens, Arc::new(RecordingSink { tx }));
    let ctx = ClientContext::default();
    let request = RegisterRequest {
        email: "flaky@x.com".to_string(),
        password: "pw123456".to_string(),
        first_name: "F".to_string(),
        last_name: "S".to_string(),
    };

    store.failing.store(true, Ordering::SeqCst);
    let outcome = assert_ok!(service.register(request.clone(), &ctx).await);
    assert_eq!(outcome.account.email, "flaky@x.com");
    assert_eq!(store.inner.account_count(), 1);
    assert_eq!(store.inner.token_counts(), (0, 0, 0));

    store.failing.store(false, Ordering::SeqCst);
    assert!(matches!(
        service.register(request, &ctx).await,
        Err(AuthError::Conflict)
    ));

    service.resend_verification("flaky@x.com").await.unwrap();
    let (_, token) = rx.recv().await.unwrap();
    service.verify_email(&token).await.unwrap();
}

#[tokio::test]
async fn expired_verification_token_is_rejected() {
    let h = Harness::with_settings(TokenSettings {
        verification_ttl_secs: -1,
        ..TokenSettings::default()
    });
    h.register("late@x.com").await.unwrap();
    let token = h.next_token().await;

    assert!(matches!(
        h.service.verify_email(&token).await,
        Err(AuthError::Expired)
    ));
}

#[tokio::test]
async fn resend_issues_a_second_working_token() {
    let h = Harness::new();
    h.register("re@x.com").await.unwrap();
    let first = h.next_token().await;

    h.service.resend_verification("re@x.com").await.unwrap();
    let second = h.next_token().await;
    assert_ne!(first, second);

    h.service.verify_email(&second).await.unwrap();
    h.login("re@x.com").await.unwrap();
}

#[tokio::test]
async fn every_login_attempt_is_audited() {
    let h = Harness::new();
    h.register("log@x.com").await.unwrap();

    let _ = h.login("log@x.com").await;
    let _ = h.login("nobody@x.com").await;

    let logins: Vec<_> = h
        .store
        .auth_logs()
        .into_iter()
        .filter(|log| log.action == "login")
        .collect();
    assert_eq!(logins.len(), 2);
    assert!(logins.iter().all(|log| !log.success));
    assert_eq!(logins[0].failure_reason.as_deref(), Some("email not verified"));
    assert_eq!(logins[1].user_id, None);
    assert_eq!(logins[1].user_agent.as_deref(), Some("integration-test"));
}

#[tokio::test]
async fn sweeping_twice_deletes_nothing_the_second_time() {
    let h = Harness::with_settings(TokenSettings {
        access_ttl_secs: 60,
        refresh_ttl_secs: -5,
        verification_ttl_secs: -5,
    });
    h.register("sweep@x.com").await.unwrap();
    let account = h
        .store
        .find_account_by_email("sweep@x.com")
        .await
        .unwrap()
        .unwrap();
    h.service
        .tokens()
        .issue_refresh_token(account.id)
        .await
        .unwrap();

    let first = run_sweep(h.service.tokens(), None).await.unwrap();
    assert_eq!(first.verification_tokens, 1);
    assert_eq!(first.refresh_tokens, 1);

    let second = h.service.tokens().sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(second.total(), 0);
    assert_eq!(h.store.token_counts(), (0, 0, 0));
}

#[tokio::test]
async fn federated_login_from_provider_claims() {
    let h = Harness::new();
    let claims = FederatedClaims {
        sub: Some("auth0|abc".into()),
        email: Some("Fed@Example.com".into()),
        email_verified: Some(true),
        given_name: Some("Fed".into()),
        family_name: Some("User".into()),
        ..FederatedClaims::default()
    };
    let profile = FederatedProfile::from_claims("auth0", claims).unwrap();

    let outcome = h
        .service
        .process_federated_login(profile.clone(), &h.ctx)
        .await
        .unwrap();
    assert!(outcome.is_new_account);
    assert_eq!(outcome.session.user.name, "Fed User");
    h.service
        .authenticate(&outcome.session.tokens.access_token)
        .await
        .unwrap();

    // Federated-only accounts have no password to log in with
    assert!(matches!(
        h.login("fed@example.com").await,
        Err(AuthError::InvalidCredentials)
    ));

    let again = h
        .service
        .process_federated_login(profile, &h.ctx)
        .await
        .unwrap();
    assert!(!again.is_new_account);
    assert_eq!(again.session.user.id, outcome.session.user.id);
}

#[tokio::test]
async fn federated_login_is_refused_for_inactive_accounts() {
    let h = Harness::new();
    h.register("off@x.com").await.unwrap();
    let account = h
        .store
        .find_account_by_email("off@x.com")
        .await
        .unwrap()
        .unwrap();
    h.store.set_account_active(account.id, false).unwrap();

    let profile = FederatedProfile {
        provider: "auth0".into(),
        subject: Some("auth0|off".into()),
        email: "off@x.com".into(),
        name: "Off".into(),
    };
    assert!(matches!(
        h.service.process_federated_login(profile, &h.ctx).await,
        Err(AuthError::AccountInactive)
    ));
}
