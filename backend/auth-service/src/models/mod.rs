/// Data models for accounts, credentials and audit records
pub mod account;
pub mod auth_log;
pub mod oauth;
pub mod tokens;

pub use account::{
    Account, AuthSession, FederatedLoginOutcome, LoginRequest, MessageResponse, NewAccount,
    PublicProfile, RefreshTokenRequest, RegisterRequest, RegistrationOutcome,
    ResendVerificationRequest, Role, VerifyEmailRequest, DEFAULT_ROLE,
};
pub use auth_log::{AuthAction, AuthAttemptLog, ClientContext, NewAuthAttempt};
pub use oauth::{FederatedClaims, FederatedProfile, OAuthCallbackQuery, StartOAuthFlowResponse};
pub use tokens::{
    EmailVerificationToken, NewRevokedToken, NewStoredToken, RefreshToken, RevokedTokenEntry,
    SweepReport, TokenKind, TokenPair,
};
