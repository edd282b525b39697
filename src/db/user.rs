use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::{AppError, AppResult, DBError},
    pagination::Pager,
};

use super::push_id_list;

pub type UserId = i64;

/// A user as seen by a particular viewer.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RegisteredUser {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, FromRow)]
pub struct UserAuth {
    pub id: UserId,
    pub hash: String,
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub hash: &'a str,
}

/// `SELECT <profile columns> FROM users`, with `is_subscribed` computed
/// against `viewer` in the same statement.
pub(crate) fn profiles_query(viewer: Option<UserId>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(
        "SELECT users.email, users.id, users.username, users.first_name, users.last_name, ",
    );
    match viewer {
        Some(viewer) => {
            qb.push(
                "EXISTS (SELECT 1 FROM subscriptions
                         WHERE subscriptions.author_id = users.id
                           AND subscriptions.subscriber_id = ",
            );
            qb.push_bind(viewer);
            qb.push(")");
        }
        None => {
            qb.push("FALSE");
        }
    }
    qb.push(" AS is_subscribed FROM users");
    qb
}

pub async fn create_user(pool: &SqlitePool, user: NewUser<'_>) -> AppResult<RegisteredUser> {
    let created = sqlx::query_as::<_, RegisteredUser>(
        "INSERT INTO users (email, username, first_name, last_name, hash)
         VALUES (?, ?, ?, ?, ?)
         RETURNING email, id, username, first_name, last_name",
    )
    .bind(user.email)
    .bind(user.username)
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.hash)
    .fetch_one(pool)
    .await;

    created.map_err(|err| {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DBError::AlreadyRegistered.into();
            }
        }
        AppError::Sqlx(err)
    })
}

pub async fn find_auth_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<UserAuth>> {
    let user = sqlx::query_as::<_, UserAuth>("SELECT id, hash FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn get_auth(pool: &SqlitePool, user_id: UserId) -> AppResult<UserAuth> {
    let user = sqlx::query_as::<_, UserAuth>("SELECT id, hash FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or(AppError::DBError(DBError::NotFound))
}

pub async fn set_password_hash(pool: &SqlitePool, user_id: UserId, hash: &str) -> AppResult<()> {
    sqlx::query("UPDATE users SET hash = ? WHERE id = ?")
        .bind(hash)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn user_exists(pool: &SqlitePool, user_id: UserId) -> AppResult<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = ?)")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

pub async fn get_user_profile(
    pool: &SqlitePool,
    user_id: UserId,
    viewer: Option<UserId>,
) -> AppResult<UserProfile> {
    let mut qb = profiles_query(viewer);
    qb.push(" WHERE users.id = ");
    qb.push_bind(user_id);

    qb.build_query_as::<UserProfile>()
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::DBError(DBError::NotFound))
}

pub async fn list_user_profiles(
    pool: &SqlitePool,
    viewer: Option<UserId>,
    pager: Pager,
) -> AppResult<(Vec<UserProfile>, i64)> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    let mut qb = profiles_query(viewer);
    qb.push(" ORDER BY users.id LIMIT ");
    qb.push_bind(pager.limit);
    qb.push(" OFFSET ");
    qb.push_bind(pager.offset());

    let users = qb.build_query_as::<UserProfile>().fetch_all(pool).await?;
    Ok((users, count))
}

pub(crate) async fn profiles_by_ids(
    pool: &SqlitePool,
    ids: &[UserId],
    viewer: Option<UserId>,
) -> AppResult<HashMap<UserId, UserProfile>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = profiles_query(viewer);
    qb.push(" WHERE users.id IN ");
    push_id_list(&mut qb, ids);

    let users = qb.build_query_as::<UserProfile>().fetch_all(pool).await?;
    Ok(users.into_iter().map(|user| (user.id, user)).collect())
}
