/// Email verification and refresh token database operations
///
/// Only SHA-256 digests of tokens are stored. Consumption is always a
/// conditional update so concurrent callers cannot both win.
use crate::error::StoreResult;
use crate::models::{EmailVerificationToken, NewStoredToken, RefreshToken};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create_verification_token(
    pool: &PgPool,
    token: &NewStoredToken,
) -> StoreResult<EmailVerificationToken> {
    let record = sqlx::query_as::<_, EmailVerificationToken>(
        r#"
        INSERT INTO email_verification_tokens (id, user_id, token_hash, expires_at, used, created_at)
        VALUES ($1, $2, $3, $4, FALSE, NOW())
        RETURNING id, user_id, token_hash, expires_at, used, used_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.expires_at)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Look up a verification token in any state
pub async fn find_verification_token(
    pool: &PgPool,
    token_hash: &str,
) -> StoreResult<Option<EmailVerificationToken>> {
    let record = sqlx::query_as::<_, EmailVerificationToken>(
        r#"
        SELECT id, user_id, token_hash, expires_at, used, used_at, created_at
        FROM email_verification_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Mark the token used and verify its account in one transaction
///
/// Returns `false` without changing anything if the token was already used
/// or has expired by `now`.
pub async fn consume_verification_token(
    pool: &PgPool,
    token_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let mut tx = pool.begin().await?;

    let user_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE email_verification_tokens
        SET used = TRUE, used_at = $2
        WHERE id = $1 AND used = FALSE AND expires_at > $2
        RETURNING user_id
        "#,
    )
    .bind(token_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user_id) = user_id else {
        tx.rollback().await?;
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE users SET email_verified = TRUE, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn create_refresh_token(
    pool: &PgPool,
    token: &NewStoredToken,
) -> StoreResult<RefreshToken> {
    let record = sqlx::query_as::<_, RefreshToken>(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, used, created_at)
        VALUES ($1, $2, $3, $4, FALSE, NOW())
        RETURNING id, user_id, token_hash, expires_at, used, used_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.expires_at)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Look up a refresh token in any state
pub async fn find_refresh_token(
    pool: &PgPool,
    token_hash: &str,
) -> StoreResult<Option<RefreshToken>> {
    let record = sqlx::query_as::<_, RefreshToken>(
        r#"
        SELECT id, user_id, token_hash, expires_at, used, used_at, created_at
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Claim a refresh token for rotation
///
/// Returns `true` only for the single caller that flips `used`.
pub async fn mark_refresh_token_used(
    pool: &PgPool,
    token_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET used = TRUE, used_at = $2
        WHERE id = $1 AND used = FALSE AND expires_at > $2
        "#,
    )
    .bind(token_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete expired verification tokens (maintenance operation)
pub async fn cleanup_expired_verification_tokens(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM email_verification_tokens WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Delete expired refresh tokens (maintenance operation)
pub async fn cleanup_expired_refresh_tokens(pool: &PgPool, now: DateTime<Utc>) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
