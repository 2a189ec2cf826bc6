use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::validators::{normalize_email, validate_email};

/// Raw identity claims as returned by a provider's userinfo endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederatedClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub nickname: Option<String>,
}

/// Identity asserted by an external provider, validated up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: String,
    pub subject: Option<String>,
    pub email: String,
    pub name: String,
}

impl FederatedProfile {
    /// Build a profile from provider claims
    ///
    /// ## Errors
    ///
    /// `InvalidProfile` if the claims carry no usable email address, or if the
    /// provider explicitly marks the address as unverified.
    pub fn from_claims(provider: &str, claims: FederatedClaims) -> Result<Self> {
        let email = claims
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::InvalidProfile("profile has no email".to_string()))?;

        if !validate_email(&email) {
            return Err(AuthError::InvalidProfile(format!(
                "malformed email: {email}"
            )));
        }
        if claims.email_verified == Some(false) {
            return Err(AuthError::InvalidProfile(
                "provider reports email as unverified".to_string(),
            ));
        }

        let name = claims
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| match (claims.given_name, claims.family_name) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (Some(given), None) => Some(given),
                (None, Some(family)) => Some(family),
                (None, None) => None,
            })
            .or(claims.nickname)
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(Self {
            provider: provider.to_string(),
            subject: claims.sub.filter(|s| !s.is_empty()),
            email,
            name: name.trim().to_string(),
        })
    }
}

/// Start OAuth flow response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartOAuthFlowResponse {
    pub auth_url: String,
    pub state: String,
}

/// Query string on the provider's redirect back to us
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
