/// Auth Service Library
///
/// Credential and session authority: password accounts with email
/// verification, rotating refresh tokens, logout blacklisting and
/// OpenID Connect federated login.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Credential store trait with PostgreSQL and in-memory backends
/// - `error`: Error types
/// - `http`: axum router and extractors
/// - `models`: Data models
/// - `security`: Password hashing and JWT keys
/// - `services`: Account service, token lifecycle, email, OAuth, sweeper
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{AuthError, Result};
pub use services::{AccountService, TokenLifecycle};
