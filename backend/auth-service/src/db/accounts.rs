/// Account database operations
use crate::error::{StoreError, StoreResult};
use crate::models::{Account, NewAccount};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Column list shared by every account read; `role` is joined from `roles`
const ACCOUNT_COLUMNS: &str = r#"
    u.id, u.email, u.name, u.password_hash, u.email_verified, u.is_active,
    u.role_id, r.name AS role, u.oauth_provider, u.oauth_subject,
    u.last_login_at, u.created_at, u.updated_at
"#;

/// Find account by (normalized) email
pub async fn find_by_email(pool: &PgPool, email: &str) -> StoreResult<Option<Account>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.email = $1"
    );
    let account = sqlx::query_as::<_, Account>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(account)
}

/// Find account by ID
pub async fn find_by_id(pool: &PgPool, account_id: Uuid) -> StoreResult<Option<Account>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
    );
    let account = sqlx::query_as::<_, Account>(&sql)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

    Ok(account)
}

/// Insert a new account
///
/// The unique index on `email` is the authority on duplicates; a violation
/// surfaces as `StoreError::Conflict`.
pub async fn create_account(pool: &PgPool, account: &NewAccount) -> StoreResult<Account> {
    if !account.has_credential() {
        return Err(StoreError::Invalid(
            "account needs a password hash or a federated identity".to_string(),
        ));
    }

    let now = Utc::now();
    let sql = format!(
        r#"
        WITH u AS (
            INSERT INTO users (
                id, email, name, password_hash, email_verified, is_active,
                role_id, oauth_provider, oauth_subject, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9, $9)
            RETURNING *
        )
        SELECT {ACCOUNT_COLUMNS} FROM u JOIN roles r ON r.id = u.role_id
        "#
    );

    let created = sqlx::query_as::<_, Account>(&sql)
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.email_verified)
        .bind(account.role_id)
        .bind(&account.oauth_provider)
        .bind(&account.oauth_subject)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(created)
}

/// Set the email verification flag
pub async fn update_verification_flag(
    pool: &PgPool,
    account_id: Uuid,
    verified: bool,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE users SET email_verified = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(verified)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("account"));
    }
    Ok(())
}

/// Record successful login timestamp
pub async fn update_last_login(
    pool: &PgPool,
    account_id: Uuid,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE users SET last_login_at = $2, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("account"));
    }
    Ok(())
}

/// Attach a federated identity to an existing account
///
/// An already stored subject is kept when the provider sends none.
pub async fn link_federated_identity(
    pool: &PgPool,
    account_id: Uuid,
    provider: &str,
    subject: Option<&str>,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET oauth_provider = $2,
            oauth_subject = COALESCE($3, oauth_subject),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(provider)
    .bind(subject)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound("account"));
    }
    Ok(())
}

/// Give an unverified account to a federated identity
///
/// The password was never proven to belong to the mailbox owner, so it is
/// dropped together with every outstanding verification and refresh token.
/// Returns `None` if the account was verified in the meantime.
pub async fn claim_unverified_account(
    pool: &PgPool,
    account_id: Uuid,
    provider: &str,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> StoreResult<Option<Account>> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        r#"
        WITH u AS (
            UPDATE users
            SET password_hash = NULL,
                email_verified = TRUE,
                oauth_subject = CASE WHEN oauth_provider IS NULL THEN $3 ELSE oauth_subject END,
                oauth_provider = COALESCE(oauth_provider, $2),
                updated_at = $4
            WHERE id = $1 AND email_verified = FALSE
            RETURNING *
        )
        SELECT {ACCOUNT_COLUMNS} FROM u JOIN roles r ON r.id = u.role_id
        "#
    );
    let claimed = sqlx::query_as::<_, Account>(&sql)
        .bind(account_id)
        .bind(provider)
        .bind(subject)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(account) = claimed else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query("DELETE FROM email_verification_tokens WHERE user_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(account))
}
