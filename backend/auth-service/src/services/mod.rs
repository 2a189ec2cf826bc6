/// Service layer for auth-service
///
/// - Account service (register, verify, login, refresh, logout, federated login)
/// - Token lifecycle engine (access, refresh, verification, revocation)
/// - Email notifications (SMTP or no-op)
/// - OpenID Connect client
/// - Background sweeper for expired credentials
pub mod account;
pub mod email;
pub mod maintenance;
pub mod oauth;
pub mod token_lifecycle;

pub use account::AccountService;
pub use email::{EmailService, NotificationSink};
pub use maintenance::{run_sweep, spawn_token_sweeper};
pub use oauth::OAuthService;
pub use token_lifecycle::TokenLifecycle;
