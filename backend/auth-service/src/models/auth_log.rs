use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of authentication event being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    Register,
    Login,
    Logout,
    Refresh,
    OAuthLogin,
}

impl AuthAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Register => "register",
            AuthAction::Login => "login",
            AuthAction::Logout => "logout",
            AuthAction::Refresh => "refresh",
            AuthAction::OAuthLogin => "oauth_login",
        }
    }
}

/// Append-only audit row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuthAttemptLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuthAttempt {
    pub user_id: Option<Uuid>,
    pub action: AuthAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    pub fn success(&self, action: AuthAction, user_id: Uuid) -> NewAuthAttempt {
        NewAuthAttempt {
            user_id: Some(user_id),
            action,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            success: true,
            failure_reason: None,
        }
    }

    pub fn failure(
        &self,
        action: AuthAction,
        user_id: Option<Uuid>,
        reason: impl Into<String>,
    ) -> NewAuthAttempt {
        NewAuthAttempt {
            user_id,
            action,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            success: false,
            failure_reason: Some(reason.into()),
        }
    }
}
