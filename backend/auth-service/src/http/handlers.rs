/// Route handlers for `/api/v1/auth`
///
/// Handlers only translate between HTTP and [`crate::services::AccountService`].
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::warn;
use validator::Validate;

use super::{
    extract::{AuthenticatedAccount, BearerToken},
    AppState,
};
use crate::error::{AuthError, Result};
use crate::models::{
    AuthSession, ClientContext, FederatedLoginOutcome, LoginRequest, MessageResponse,
    OAuthCallbackQuery, PublicProfile, RefreshTokenRequest, RegisterRequest,
    ResendVerificationRequest, StartOAuthFlowResponse, VerifyEmailRequest,
};

type AppStateRef = State<Arc<AppState>>;

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn register(
    State(state): AppStateRef,
    ctx: ClientContext,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.accounts.register(req, &ctx).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn login(
    State(state): AppStateRef,
    ctx: ClientContext,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthSession>> {
    Ok(Json(state.accounts.login(req, &ctx).await?))
}

pub async fn refresh(
    State(state): AppStateRef,
    ctx: ClientContext,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthSession>> {
    let session = state
        .accounts
        .refresh_access_token(&req.refresh_token, &ctx)
        .await?;
    Ok(Json(session))
}

/// `GET /verify-email?token=...`, the target of the emailed link
pub async fn verify_email_link(
    State(state): AppStateRef,
    Query(req): Query<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>> {
    verify_email_token(&state, &req.token).await
}

pub async fn verify_email(
    State(state): AppStateRef,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>> {
    verify_email_token(&state, &req.token).await
}

async fn verify_email_token(state: &AppState, token: &str) -> Result<Json<MessageResponse>> {
    state.accounts.verify_email(token).await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

pub async fn resend_verification(
    State(state): AppStateRef,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>> {
    req.validate()?;
    state.accounts.resend_verification(&req.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// Takes the raw bearer so repeated and failed logouts still reach the audit log
pub async fn logout(
    State(state): AppStateRef,
    ctx: ClientContext,
    bearer: Option<BearerToken>,
) -> Result<Json<MessageResponse>> {
    let token = bearer.map(|BearerToken(token)| token).unwrap_or_default();
    state.accounts.logout_bearer(&token, &ctx).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

pub async fn profile(
    State(state): AppStateRef,
    auth: AuthenticatedAccount,
) -> Result<Json<PublicProfile>> {
    Ok(Json(state.accounts.get_profile(auth.account_id).await?))
}

pub async fn oauth_login(State(state): AppStateRef) -> Result<Json<StartOAuthFlowResponse>> {
    let oauth = state
        .oauth
        .as_ref()
        .ok_or(AuthError::NotFound("OAuth provider"))?;
    Ok(Json(oauth.authorization_url()?))
}

pub async fn oauth_callback(
    State(state): AppStateRef,
    ctx: ClientContext,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Json<FederatedLoginOutcome>> {
    let oauth = state
        .oauth
        .as_ref()
        .ok_or(AuthError::NotFound("OAuth provider"))?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        warn!(error = %error, description = %description, "OAuth provider returned an error");
        return Err(AuthError::OAuth(format!("{error}: {description}")));
    }

    let (Some(code), Some(flow_state)) = (query.code, query.state) else {
        return Err(AuthError::Validation(
            "code and state query parameters are required".to_string(),
        ));
    };

    let profile = oauth.complete_flow(&flow_state, &code).await?;
    let outcome = state.accounts.process_federated_login(profile, &ctx).await?;
    Ok(Json(outcome))
}
