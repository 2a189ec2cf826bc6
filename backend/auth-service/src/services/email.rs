/// Email delivery for verification links
use crate::config::EmailSettings;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Landing page used when no verification base URL is configured
const DEFAULT_VERIFICATION_BASE_URL: &str = "http://localhost:8080/api/v1/auth/verify-email";

/// Outbound channel for account notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a verification link carrying `token` to `to_email`
    async fn send_verification_link(&self, to_email: &str, token: &str) -> Result<()>;
}

/// Async email transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    verification_base_url: Option<String>,
}

impl EmailService {
    /// Build email service from configuration
    ///
    /// If SMTP host is empty, operates in no-op mode (logs only).
    /// Useful for development and testing without email infrastructure.
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; email service will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| AuthError::Internal(format!("Failed to configure SMTP transport: {}", e)))?
            .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self {
            transport,
            from,
            verification_base_url: config.verification_base_url.clone(),
        })
    }

    /// Check if SMTP transport is enabled
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub fn verification_link(&self, token: &str) -> String {
        let base = match self.verification_base_url.as_deref() {
            Some(base) if !base.is_empty() => base,
            _ => DEFAULT_VERIFICATION_BASE_URL,
        };
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}token={token}")
    }

    async fn send_mail(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                subject,
                recipient, "Email service running in no-op mode; skipping actual send"
            );
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| AuthError::Validation(format!("Invalid recipient email address: {}", e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AuthError::Internal(format!("Failed to build email message: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| AuthError::Infrastructure(format!("Failed to send email: {}", e)))?;
        info!(subject, "email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for EmailService {
    async fn send_verification_link(&self, to_email: &str, token: &str) -> Result<()> {
        let link = self.verification_link(token);
        let body = format!(
            "Welcome!\n\nPlease open the following link to verify your email address:\n{}\n\nThe link expires in 24 hours. If you did not create an account, please ignore this email.",
            link
        );
        self.send_mail(to_email, "Verify your email address", &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base: Option<&str>) -> EmailSettings {
        EmailSettings {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: "noreply@localhost".to_string(),
            use_starttls: true,
            verification_base_url: base.map(str::to_string),
        }
    }

    #[test]
    fn test_verification_link_uses_configured_base() {
        let service = EmailService::new(&settings(Some("https://app.example.com/verify"))).unwrap();
        assert_eq!(
            service.verification_link("abc"),
            "https://app.example.com/verify?token=abc"
        );

        let service =
            EmailService::new(&settings(Some("https://app.example.com/v?lang=en"))).unwrap();
        assert_eq!(
            service.verification_link("abc"),
            "https://app.example.com/v?lang=en&token=abc"
        );
    }

    #[test]
    fn test_verification_link_default_base() {
        let service = EmailService::new(&settings(None)).unwrap();
        assert!(service
            .verification_link("abc")
            .ends_with("/api/v1/auth/verify-email?token=abc"));
    }

    #[tokio::test]
    async fn test_noop_mode_sends_nothing_and_succeeds() {
        let service = EmailService::new(&settings(None)).unwrap();
        assert!(!service.is_enabled());
        service
            .send_verification_link("a@x.com", "token")
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_from_address_rejected() {
        let mut config = settings(None);
        config.smtp_from = "not an address".to_string();
        assert!(EmailService::new(&config).is_err());
    }
}
