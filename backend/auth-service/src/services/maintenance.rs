/// Periodic cleanup of expired credentials
use crate::error::Result;
use crate::models::SweepReport;
use crate::services::oauth::OAuthService;
use crate::services::token_lifecycle::TokenLifecycle;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Spawn the background sweeper
///
/// Every `period` it deletes expired verification tokens, refresh tokens and
/// blacklist entries, and prunes stale OAuth states. Failures are logged and
/// the next tick tries again.
pub fn spawn_token_sweeper(
    tokens: TokenLifecycle,
    oauth: Option<OAuthService>,
    period: Duration,
) -> JoinHandle<()> {
    info!(interval_secs = period.as_secs(), "Starting expired token sweeper");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so start-up stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(err) = run_sweep(&tokens, oauth.as_ref()).await {
                error!(error = %err, "expired token sweep failed");
            }
        }
    })
}

/// One sweep pass
pub async fn run_sweep(tokens: &TokenLifecycle, oauth: Option<&OAuthService>) -> Result<SweepReport> {
    let report = tokens.sweep_expired(Utc::now()).await?;
    let states = oauth.map(OAuthService::prune_expired_states).unwrap_or(0);

    if report.total() > 0 || states > 0 {
        info!(
            verification_tokens = report.verification_tokens,
            refresh_tokens = report.refresh_tokens,
            revoked_tokens = report.revoked_tokens,
            oauth_states = states,
            "expired credentials swept"
        );
    } else {
        debug!("expired token sweep found nothing to delete");
    }

    Ok(report)
}
