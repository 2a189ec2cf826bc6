/// OpenID Connect login against a hosted identity provider
///
/// Drives the authorization-code flow:
/// 1. [`OAuthService::authorization_url`] mints a `state` and the provider URL
/// 2. the provider redirects back with `code` and `state`
/// 3. [`OAuthService::complete_flow`] checks the state, exchanges the code and
///    reads the user's claims into a [`FederatedProfile`]
///
/// ## Security
///
/// - State tokens are random, single-use and expire after 10 minutes
/// - Code exchange and userinfo calls go to the configured provider only
/// - Claims are validated into a typed profile before any account is touched
use crate::config::OAuthSettings;
use crate::error::{AuthError, Result};
use crate::models::{FederatedClaims, FederatedProfile, StartOAuthFlowResponse};
use crate::security::generate_opaque_token;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const OAUTH_STATE_TTL_SECS: i64 = 600; // 10 minutes

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// OIDC client with in-process pending-state tracking
#[derive(Clone)]
pub struct OAuthService {
    config: OAuthSettings,
    http: Client,
    pending_states: Arc<DashMap<String, DateTime<Utc>>>,
}

impl OAuthService {
    pub fn new(config: OAuthSettings) -> Self {
        Self {
            config,
            http: Client::new(),
            pending_states: Arc::new(DashMap::new()),
        }
    }

    /// Provider name recorded on linked accounts
    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Generate the provider authorization URL with a fresh state token
    ///
    /// ## Returns
    ///
    /// Authorization URL and the state the callback must echo back
    pub fn authorization_url(&self) -> Result<StartOAuthFlowResponse> {
        let state = generate_opaque_token();
        let mut url = self.endpoint("/authorize")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state);

        self.pending_states
            .insert(state.clone(), Utc::now() + Duration::seconds(OAUTH_STATE_TTL_SECS));
        debug!(pending = self.pending_states.len(), "OAuth state issued");

        Ok(StartOAuthFlowResponse {
            auth_url: url.to_string(),
            state,
        })
    }

    /// Check and retire a state token
    ///
    /// A state is accepted once and only before it expires.
    pub fn consume_state(&self, state: &str) -> Result<()> {
        match self.pending_states.remove(state) {
            Some((_, expires_at)) if expires_at > Utc::now() => Ok(()),
            Some(_) => {
                warn!("OAuth state expired");
                Err(AuthError::OAuth("state expired".to_string()))
            }
            None => {
                warn!("unknown or reused OAuth state");
                Err(AuthError::OAuth("invalid state".to_string()))
            }
        }
    }

    /// Drop every pending state past its expiry, returning how many were removed
    pub fn prune_expired_states(&self) -> usize {
        let now = Utc::now();
        let before = self.pending_states.len();
        self.pending_states.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.pending_states.len())
    }

    /// Complete the flow after the provider callback
    ///
    /// ## Arguments
    ///
    /// * `state` - State token issued by [`Self::authorization_url`]
    /// * `code` - Authorization code from the provider
    pub async fn complete_flow(&self, state: &str, code: &str) -> Result<FederatedProfile> {
        self.consume_state(state)?;
        let access_token = self.exchange_code(code).await?;
        let claims = self.fetch_claims(&access_token).await?;
        let profile = FederatedProfile::from_claims(&self.config.provider, claims)?;
        info!(provider = %profile.provider, "OAuth profile retrieved");
        Ok(profile)
    }

    /// Exchange an authorization code for a provider access token
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let url = self.endpoint("/oauth/token")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::OAuth(format!("code exchange rejected: {e}")))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?;

        debug!(token_type = ?response.token_type, "authorization code exchanged");
        Ok(response.access_token)
    }

    /// Fetch the signed-in user's claims from the userinfo endpoint
    pub async fn fetch_claims(&self, access_token: &str) -> Result<FederatedClaims> {
        let url = self.endpoint("/userinfo")?;
        self.http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::OAuth(format!("userinfo rejected: {e}")))?
            .json::<FederatedClaims>()
            .await
            .map_err(|e| AuthError::OAuth(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let domain = self.config.domain.trim_end_matches('/');
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| AuthError::Internal(format!("Invalid OAuth domain: {e}")))
    }
}
