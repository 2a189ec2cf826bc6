/// Account service
///
/// Public operation surface of the auth service. Every operation takes plain
/// structured input and returns `Result<Payload, AuthError>`; the HTTP layer
/// only translates.
///
/// Account states: unregistered -> pending verification -> active, with an
/// `is_active` flag that blocks login at any point.
///
/// ## Security
///
/// - Unknown email and wrong password answer with the same error and cost
/// - Login, logout, refresh and federated login always leave an audit entry
/// - Secrets (passwords, raw tokens) are never logged
use crate::db::CredentialStore;
use crate::error::{AuthError, Result, StoreError};
use crate::models::{
    Account, AuthAction, AuthSession, ClientContext, FederatedLoginOutcome, FederatedProfile,
    LoginRequest, NewAccount, NewAuthAttempt, PublicProfile, RegisterRequest,
    RegistrationOutcome, DEFAULT_ROLE,
};
use crate::security::{hash_password, verify_against_dummy, verify_password, AccessClaims};
use crate::services::email::NotificationSink;
use crate::services::token_lifecycle::TokenLifecycle;
use crate::validators::{display_name, normalize_email, validate_email, validate_password};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const REGISTRATION_MESSAGE: &str =
    "Registration successful. Please check your email to verify your account.";

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenLifecycle,
    notifier: Arc<dyn NotificationSink>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenLifecycle,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            tokens,
            notifier,
        }
    }

    pub fn tokens(&self) -> &TokenLifecycle {
        &self.tokens
    }

    /// Register a password account pending email verification
    ///
    /// The verification link is delivered on a detached task. Once the account
    /// is stored, token, delivery and audit failures are logged and never fail
    /// the registration.
    ///
    /// ## Errors
    ///
    /// - `Validation` for a malformed email, a password outside 8-128 characters or blank names
    /// - `Conflict` if the email is already registered
    #[instrument(skip_all, fields(email = %normalize_email(&req.email)))]
    pub async fn register(
        &self,
        mut req: RegisterRequest,
        ctx: &ClientContext,
    ) -> Result<RegistrationOutcome> {
        req.email = normalize_email(&req.email);
        req.validate()?;
        let email = req.email.clone();
        if !validate_email(&email) {
            return Err(AuthError::Validation("Invalid email address format".to_string()));
        }
        validate_password(&req.password).map_err(AuthError::Validation)?;
        let name = display_name(&req.first_name, &req.last_name);
        if name.is_empty() {
            return Err(AuthError::Validation("Name must not be empty".to_string()));
        }

        if self.store.find_account_by_email(&email).await?.is_some() {
            warn!("registration for existing email rejected");
            return Err(AuthError::Conflict);
        }

        let password_hash = hash_password(&req.password)?;
        let role = self.store.ensure_role(DEFAULT_ROLE).await?;
        // The unique constraint is authoritative if a concurrent registration won
        let account = self
            .store
            .create_account(NewAccount::with_password(
                email.clone(),
                name,
                password_hash,
                &role,
            ))
            .await?;

        // The account exists from here on; later failures are recoverable
        // through ResendVerification and must not turn a retry into Conflict
        match self.tokens.issue_verification_token(account.id).await {
            Ok(token) => {
                let notifier = Arc::clone(&self.notifier);
                let recipient = account.email.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.send_verification_link(&recipient, &token).await {
                        error!(error = %e, "failed to deliver verification email");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, user_id = %account.id, "failed to issue verification token");
            }
        }

        if let Err(e) = self.audit(ctx.success(AuthAction::Register, account.id)).await {
            warn!(error = %e, user_id = %account.id, "registration not audited");
        }
        info!(user_id = %account.id, "account registered");

        Ok(RegistrationOutcome {
            account: PublicProfile::from(&account),
            message: REGISTRATION_MESSAGE.to_string(),
        })
    }

    /// Consume a verification token and mark its account verified
    ///
    /// ## Errors
    ///
    /// `NotFound`, `AlreadyUsed` or `Expired` for the token
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<PublicProfile> {
        let account_id = self.tokens.consume_verification_token(token).await?;
        let account = self.require_account(account_id).await?;
        info!(user_id = %account.id, "email verified");
        Ok(PublicProfile::from(&account))
    }

    /// Issue and deliver a fresh verification token
    ///
    /// Earlier tokens stay valid until they expire.
    ///
    /// ## Errors
    ///
    /// - `NotFound` if no account has this email
    /// - `AlreadyVerified` if there is nothing to verify
    /// - `Infrastructure` if delivery fails
    #[instrument(skip_all, fields(email = %normalize_email(email)))]
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound("account"))?;
        if account.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let token = self.tokens.issue_verification_token(account.id).await?;
        self.notifier
            .send_verification_link(&account.email, &token)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %account.id, "failed to resend verification email");
                AuthError::Infrastructure(e.to_string())
            })?;

        info!(user_id = %account.id, "verification email resent");
        Ok(())
    }

    /// Password login
    ///
    /// ## Errors
    ///
    /// - `InvalidCredentials` for an unknown email, a wrong password or an
    ///   account without a local password
    /// - `AccountInactive` / `NotVerified` once the password has been checked
    #[instrument(skip_all, fields(email = %normalize_email(&req.email)))]
    pub async fn login(&self, mut req: LoginRequest, ctx: &ClientContext) -> Result<AuthSession> {
        req.email = normalize_email(&req.email);
        if let Err(e) = req.validate() {
            self.audit(ctx.failure(AuthAction::Login, None, "malformed request"))
                .await?;
            return Err(e.into());
        }
        let email = req.email.as_str();

        let Some(account) = self.store.find_account_by_email(email).await? else {
            verify_against_dummy(&req.password);
            warn!("login for unknown email");
            self.audit(ctx.failure(AuthAction::Login, None, "unknown email"))
                .await?;
            return Err(AuthError::InvalidCredentials);
        };

        let Some(password_hash) = account.password_hash.as_deref() else {
            verify_against_dummy(&req.password);
            warn!(user_id = %account.id, "password login for federated-only account");
            self.audit(ctx.failure(AuthAction::Login, Some(account.id), "no local password"))
                .await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(&req.password, password_hash) {
            warn!(user_id = %account.id, "invalid password");
            self.audit(ctx.failure(AuthAction::Login, Some(account.id), "invalid password"))
                .await?;
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active {
            self.audit(ctx.failure(AuthAction::Login, Some(account.id), "account inactive"))
                .await?;
            return Err(AuthError::AccountInactive);
        }
        if !account.email_verified {
            self.audit(ctx.failure(AuthAction::Login, Some(account.id), "email not verified"))
                .await?;
            return Err(AuthError::NotVerified);
        }

        let session = self.open_session(account).await?;
        self.audit(ctx.success(AuthAction::Login, session.user.id))
            .await?;
        info!(user_id = %session.user.id, "login succeeded");
        Ok(session)
    }

    /// Exchange a refresh token for a new pair; the old token is retired
    ///
    /// ## Errors
    ///
    /// - `NotFound` / `AlreadyUsed` / `Expired` for the token
    /// - `NotFound` if the account is gone, `AccountInactive` if it is disabled
    #[instrument(skip_all)]
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        ctx: &ClientContext,
    ) -> Result<AuthSession> {
        let account_id = match self.tokens.consume_refresh_token(refresh_token).await {
            Ok(id) => id,
            Err(e) => {
                self.audit(ctx.failure(AuthAction::Refresh, None, e.to_string()))
                    .await?;
                return Err(e);
            }
        };

        let account = match self.store.find_account_by_id(account_id).await? {
            Some(account) if account.is_active => account,
            Some(_) => {
                self.audit(ctx.failure(AuthAction::Refresh, Some(account_id), "account inactive"))
                    .await?;
                return Err(AuthError::AccountInactive);
            }
            None => {
                self.audit(ctx.failure(AuthAction::Refresh, Some(account_id), "account not found"))
                    .await?;
                return Err(AuthError::NotFound("account"));
            }
        };

        let tokens = self.tokens.issue_token_pair(account.id).await?;
        self.audit(ctx.success(AuthAction::Refresh, account.id))
            .await?;
        Ok(AuthSession {
            tokens,
            user: PublicProfile::from(&account),
        })
    }

    /// Revoke the presented access token
    ///
    /// Idempotent: logging out twice with the same token succeeds.
    ///
    /// ## Errors
    ///
    /// - `InvalidToken` if the token does not verify or belongs to another account
    /// - `Expired` if it already expired
    #[instrument(skip_all, fields(account_id = %account_id))]
    pub async fn logout(
        &self,
        access_token: &str,
        account_id: Uuid,
        ctx: &ClientContext,
    ) -> Result<()> {
        if let Err(e) = self
            .tokens
            .revoke_access_token(access_token, account_id)
            .await
        {
            self.audit(ctx.failure(AuthAction::Logout, Some(account_id), e.to_string()))
                .await?;
            return Err(e);
        }

        self.audit(ctx.success(AuthAction::Logout, account_id))
            .await?;
        info!(user_id = %account_id, "logged out");
        Ok(())
    }

    /// Logout for a bearer whose account is only known from the token itself
    ///
    /// Tokens that do not verify are still audited, without an account.
    #[instrument(skip_all)]
    pub async fn logout_bearer(&self, access_token: &str, ctx: &ClientContext) -> Result<()> {
        let account_id = match self.tokens.token_subject(access_token) {
            Ok(id) => id,
            Err(e) => {
                self.audit(ctx.failure(AuthAction::Logout, None, e.to_string()))
                    .await?;
                return Err(e);
            }
        };
        self.logout(access_token, account_id, ctx).await
    }

    pub async fn get_profile(&self, account_id: Uuid) -> Result<PublicProfile> {
        let account = self.require_account(account_id).await?;
        Ok(PublicProfile::from(&account))
    }

    /// Validate a bearer access token, blacklist included
    pub async fn authenticate(&self, access_token: &str) -> Result<AccessClaims> {
        self.tokens.validate_access_token(access_token).await
    }

    /// Sign in (or sign up) with an identity asserted by an external provider
    ///
    /// An existing account with the same email is linked to the provider and
    /// marked verified; otherwise a password-less, verified account is created.
    /// An unverified account loses its local password and outstanding tokens,
    /// since only the provider has shown control of the address.
    ///
    /// ## Errors
    ///
    /// - `InvalidProfile` if the profile has no well-formed email
    /// - `AccountInactive` if the matching account is disabled
    #[instrument(skip_all, fields(provider = %profile.provider))]
    pub async fn process_federated_login(
        &self,
        profile: FederatedProfile,
        ctx: &ClientContext,
    ) -> Result<FederatedLoginOutcome> {
        let email = normalize_email(&profile.email);
        if !validate_email(&email) {
            self.audit(ctx.failure(AuthAction::OAuthLogin, None, "invalid profile email"))
                .await?;
            return Err(AuthError::InvalidProfile(
                "profile email is missing or malformed".to_string(),
            ));
        }
        let profile = FederatedProfile { email, ..profile };

        let existing = self.store.find_account_by_email(&profile.email).await?;
        let (account, is_new_account) = match existing {
            Some(account) => (self.adopt_existing(account, &profile, ctx).await?, false),
            None => self.create_federated(&profile).await?,
        };

        let session = self.open_session(account).await?;
        self.audit(ctx.success(AuthAction::OAuthLogin, session.user.id))
            .await?;
        info!(user_id = %session.user.id, is_new_account, "federated login succeeded");

        Ok(FederatedLoginOutcome {
            session,
            is_new_account,
        })
    }

    async fn adopt_existing(
        &self,
        mut account: Account,
        profile: &FederatedProfile,
        ctx: &ClientContext,
    ) -> Result<Account> {
        if !account.is_active {
            self.audit(ctx.failure(AuthAction::OAuthLogin, Some(account.id), "account inactive"))
                .await?;
            return Err(AuthError::AccountInactive);
        }

        if !account.email_verified && account.password_hash.is_some() {
            // Whoever set the password never proved they own the mailbox
            match self
                .store
                .claim_unverified_account(
                    account.id,
                    &profile.provider,
                    profile.subject.as_deref(),
                    Utc::now(),
                )
                .await?
            {
                Some(claimed) => {
                    warn!(user_id = %claimed.id, "unverified local password dropped for federated login");
                    return Ok(claimed);
                }
                // Verified through the emailed link in the meantime
                None => account = self.require_account(account.id).await?,
            }
        } else if !account.email_verified {
            // The provider vouches for the address
            self.store
                .update_verification_flag(account.id, true)
                .await?;
            account.email_verified = true;
        }

        if account.oauth_provider.is_none() {
            self.store
                .link_federated_identity(account.id, &profile.provider, profile.subject.as_deref())
                .await?;
            account.oauth_provider = Some(profile.provider.clone());
            account.oauth_subject = profile.subject.clone();
            info!(user_id = %account.id, provider = %profile.provider, "federated identity linked");
        }

        Ok(account)
    }

    async fn create_federated(&self, profile: &FederatedProfile) -> Result<(Account, bool)> {
        let role = self.store.ensure_role(DEFAULT_ROLE).await?;
        match self
            .store
            .create_account(NewAccount::federated(profile, &role))
            .await
        {
            Ok(account) => Ok((account, true)),
            Err(StoreError::Conflict(_)) => {
                // A concurrent login created it first
                let account = self
                    .store
                    .find_account_by_email(&profile.email)
                    .await?
                    .ok_or(AuthError::NotFound("account"))?;
                Ok((account, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_session(&self, mut account: Account) -> Result<AuthSession> {
        let tokens = self.tokens.issue_token_pair(account.id).await?;
        let now = Utc::now();
        self.store.update_last_login(account.id, now).await?;
        account.last_login_at = Some(now);
        Ok(AuthSession {
            tokens,
            user: PublicProfile::from(&account),
        })
    }

    async fn require_account(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::NotFound("account"))
    }

    async fn audit(&self, entry: NewAuthAttempt) -> Result<()> {
        self.store.append_auth_log(entry).await.map_err(|e| {
            error!(error = %e, "failed to append auth log");
            AuthError::Infrastructure(e.to_string())
        })?;
        Ok(())
    }
}
