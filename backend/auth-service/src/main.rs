/// Auth Service Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL connection pool (in-memory store when unconfigured outside production)
/// - JWT keys (RS256 or HS256)
/// - Email service (SMTP or no-op)
/// - OpenID Connect client (optional)
/// - Expired token sweeper (background task)
use anyhow::{bail, Context, Result};
use auth_service::{
    config::Settings,
    db::{CredentialStore, InMemoryCredentialStore, PgCredentialStore},
    http::{start_http_server, AppState},
    services::{spawn_token_sweeper, AccountService, EmailService, OAuthService, TokenLifecycle},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "auth_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Auth Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!(environment = ?settings.environment, "Configuration loaded successfully");

    let keys = settings
        .jwt
        .keys()
        .context("Failed to initialize JWT keys")?;
    info!(algorithm = ?keys.algorithm(), "JWT keys initialized");

    let store: Arc<dyn CredentialStore> = match settings.database.url.as_deref() {
        Some(url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(settings.database.max_connections)
                .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
                .connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;

            info!(
                "Database pool initialized with {} max connections",
                settings.database.max_connections
            );

            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .context("Failed to run database migrations")?;
            info!("Database migrations completed");

            Arc::new(PgCredentialStore::new(db_pool))
        }
        None if settings.environment.is_production_like() => {
            bail!("DATABASE_URL must be set in production and staging");
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory credential store (development only)");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    // Initialize email service
    let email_service =
        EmailService::new(&settings.email).context("Failed to initialize email service")?;
    if email_service.is_enabled() {
        info!("Email service initialized with SMTP");
    } else {
        info!("Email service running in no-op mode (SMTP not configured)");
    }

    let oauth = settings.oauth.clone().map(|config| {
        info!(provider = %config.provider, "OAuth provider configured");
        OAuthService::new(config)
    });
    if oauth.is_none() {
        info!("OAuth provider not configured; federated login disabled");
    }

    let tokens = TokenLifecycle::new(Arc::clone(&store), keys, settings.tokens.clone());
    let accounts = AccountService::new(store, tokens.clone(), Arc::new(email_service));

    let sweeper = spawn_token_sweeper(
        tokens,
        oauth.clone(),
        Duration::from_secs(settings.maintenance.sweep_interval_secs),
    );

    let state = AppState {
        accounts,
        oauth,
        trust_proxy_headers: settings.server.trust_proxy_headers,
    };
    start_http_server(
        state,
        &settings.server.host,
        settings.server.port,
        shutdown_signal(),
    )
    .await
    .context("HTTP server error")?;

    sweeper.abort();
    info!("Auth service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
