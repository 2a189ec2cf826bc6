/// Request extractors shared by the auth routes
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use uuid::Uuid;

use super::AppState;
use crate::error::AuthError;
use crate::models::ClientContext;
use crate::security::AccessClaims;

/// Account behind a valid `Authorization: Bearer <jwt>` header
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account_id: Uuid,
    pub token: String,
    pub claims: AccessClaims,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedAccount {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::InvalidToken)?;
        let claims = state.accounts.authenticate(token).await?;
        let account_id = claims.subject()?;

        Ok(Self {
            account_id,
            token: token.to_string(),
            claims,
        })
    }
}

/// Raw `Authorization: Bearer` value, not validated
///
/// For routes that must see tokens the blacklist already rejects.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(|token| Self(token.to_string()))
            .ok_or(AuthError::InvalidToken)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(client_context(parts, state.trust_proxy_headers))
    }
}

/// Proxy headers are client-controlled unless a proxy rewrites them
fn client_context(parts: &Parts, trust_proxy_headers: bool) -> ClientContext {
    let socket = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let forwarded = if trust_proxy_headers {
        client_ip(&parts.headers)
    } else {
        None
    };

    let user_agent = header_str(&parts.headers, header::USER_AGENT.as_str()).map(str::to_string);

    ClientContext::new(forwarded.or(socket), user_agent)
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, header::AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
