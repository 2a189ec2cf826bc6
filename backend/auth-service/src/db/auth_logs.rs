/// Authentication audit log database operations
use crate::error::StoreResult;
use crate::models::{AuthAttemptLog, NewAuthAttempt};
use sqlx::PgPool;
use uuid::Uuid;

/// Append one audit row
pub async fn append(pool: &PgPool, attempt: &NewAuthAttempt) -> StoreResult<AuthAttemptLog> {
    let log = sqlx::query_as::<_, AuthAttemptLog>(
        r#"
        INSERT INTO auth_logs (id, user_id, action, ip_address, user_agent, success, failure_reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        RETURNING id, user_id, action, ip_address, user_agent, success, failure_reason, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(attempt.user_id)
    .bind(attempt.action.as_str())
    .bind(&attempt.ip_address)
    .bind(&attempt.user_agent)
    .bind(attempt.success)
    .bind(&attempt.failure_reason)
    .fetch_one(pool)
    .await?;

    Ok(log)
}
