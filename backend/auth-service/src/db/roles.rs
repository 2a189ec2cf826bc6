/// Role database operations
use crate::error::StoreResult;
use crate::models::Role;
use sqlx::PgPool;
use uuid::Uuid;

/// Fetch a role by name, creating it on first use
pub async fn ensure_role(pool: &PgPool, name: &str) -> StoreResult<Role> {
    let role = sqlx::query_as::<_, Role>(
        r#"
        INSERT INTO roles (id, name, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(role)
}
