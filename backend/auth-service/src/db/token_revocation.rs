/// Access-token blacklist database operations
use crate::error::StoreResult;
use crate::models::NewRevokedToken;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Record a revoked token in the blacklist
///
/// Returns `false` if the `jti` was already blacklisted.
pub async fn revoke_token(pool: &PgPool, entry: &NewRevokedToken) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO revoked_tokens (jti, user_id, expires_at, revoked_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(&entry.jti)
    .bind(entry.user_id)
    .bind(entry.expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Check if a token (by JTI) is revoked
pub async fn is_jti_revoked(pool: &PgPool, jti: &str) -> StoreResult<bool> {
    let revoked = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1)
        "#,
    )
    .bind(jti)
    .fetch_one(pool)
    .await?;

    Ok(revoked)
}

/// Delete expired revocation records (maintenance operation)
pub async fn cleanup_expired_revocations(pool: &PgPool, now: DateTime<Utc>) -> StoreResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM revoked_tokens
        WHERE expires_at <= $1
        "#,
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
