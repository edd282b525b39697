use chrono::Utc;
use sqlx::SqlitePool;

use crate::{auth::generate_token, error::AppResult};

use super::UserId;

/// Returns the caller's existing key, minting one on first login.
pub async fn get_or_create_token(pool: &SqlitePool, user_id: UserId) -> AppResult<String> {
    sqlx::query(
        "INSERT INTO auth_tokens (key, user_id, created_at)
         VALUES (?, ?, ?)
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(generate_token())
    .bind(user_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let key = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(key)
}

pub async fn user_for_token(pool: &SqlitePool, key: &str) -> AppResult<Option<UserId>> {
    let user_id = sqlx::query_scalar("SELECT user_id FROM auth_tokens WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(user_id)
}

pub async fn delete_token(pool: &SqlitePool, user_id: UserId) -> AppResult<()> {
    sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}
