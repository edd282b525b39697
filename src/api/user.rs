use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    auth::{self, AuthHeader},
    config::Config,
    db::{self, UserId},
    error::{AppError, AppResult},
    pagination::{PageQuery, Pager},
};

// ================================================= REGISTRATION ================================================= //

#[derive(Deserialize, Validate)]
pub struct Registration {
    #[validate(
        length(min = 1, max = 254, message = "email must be 1-254 characters"),
        email(message = "invalid email address")
    )]
    email: String,

    #[validate(length(min = 1, max = 150, message = "user name must be 1-150 characters"))]
    username: String,

    #[validate(length(min = 1, max = 150, message = "first name must be 1-150 characters"))]
    first_name: String,

    #[validate(length(min = 1, max = 150, message = "last name must be 1-150 characters"))]
    last_name: String,

    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    password: String,
}

// POST /api/users
pub async fn registration(
    State(pool): State<SqlitePool>,
    Json(user): Json<Registration>,
) -> AppResult<impl IntoResponse> {
    user.validate()?;

    let hash = auth::hash_password(&user.password)?;
    let created = db::create_user(
        &pool,
        db::NewUser {
            email: &user.email,
            username: &user.username,
            first_name: &user.first_name,
            last_name: &user.last_name,
            hash: &hash,
        },
    )
    .await?;

    tracing::info!(user_id = created.id, "user registered");
    Ok((StatusCode::CREATED, Json(created)))
}

// ================================================= PROFILES ================================================= //

// GET /api/users
pub async fn list_users(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<PageQuery>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let viewer = auth::viewer(&pool, token).await?;
    let pager = Pager::from_query(&query, config.page_size)?;

    let (users, count) = db::list_user_profiles(&pool, viewer, pager).await?;
    Ok(Json(pager.finish(users, count, &uri)?))
}

// GET /api/users/:id
pub async fn get_user(
    State(pool): State<SqlitePool>,
    Path(user_id): Path<UserId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let viewer = auth::viewer(&pool, token).await?;
    let profile = db::get_user_profile(&pool, user_id, viewer).await?;
    Ok(Json(profile))
}

// GET /api/users/me
pub async fn get_current_user(
    State(pool): State<SqlitePool>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    let profile = db::get_user_profile(&pool, user_id, Some(user_id)).await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPassword {
    #[validate(length(min = 8, max = 128, message = "password must be 8-128 characters"))]
    new_password: String,
    #[validate(length(min = 1, message = "current password can't be blank"))]
    current_password: String,
}

// POST /api/users/set_password
pub async fn set_password(
    State(pool): State<SqlitePool>,
    token: AuthHeader,
    Json(passwords): Json<SetPassword>,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    passwords.validate()?;

    let user = db::get_auth(&pool, user_id).await?;
    if !auth::verify_password(&user.hash, &passwords.current_password)? {
        return Err(AppError::validation("current password does not match"));
    }

    let hash = auth::hash_password(&passwords.new_password)?;
    db::set_password_hash(&pool, user_id, &hash).await?;

    Ok(StatusCode::NO_CONTENT)
}

// ================================================= SUBSCRIPTIONS ================================================= //

// POST /api/users/:id/subscribe
pub async fn subscribe(
    State(pool): State<SqlitePool>,
    Path(author_id): Path<UserId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let subscriber_id = auth::require_user(&pool, token).await?;

    db::subscribe(&pool, author_id, subscriber_id).await?;

    let author = db::get_user_profile(&pool, author_id, Some(subscriber_id)).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

// DELETE /api/users/:id/subscribe
pub async fn unsubscribe(
    State(pool): State<SqlitePool>,
    Path(author_id): Path<UserId>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let subscriber_id = auth::require_user(&pool, token).await?;
    db::unsubscribe(&pool, author_id, subscriber_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    limit: Option<String>,
    #[serde(default)]
    recipes_limit: Option<String>,
}

// GET /api/users/subscriptions
pub async fn subscriptions(
    State(pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<SubscriptionsQuery>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;

    let recipes_limit = parse_recipes_limit(query.recipes_limit.as_deref(), config.page_size)?;
    let pager = Pager::parse(query.page.as_deref(), query.limit.as_deref(), config.page_size)?;

    let (authors, count) = db::list_subscriptions(&pool, user_id, pager, recipes_limit).await?;
    Ok(Json(pager.finish(authors, count, &uri)?))
}

fn parse_recipes_limit(raw: Option<&str>, default: i64) -> AppResult<i64> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    match raw.trim().parse::<i64>() {
        Ok(limit) if limit >= 0 => Ok(limit),
        _ => Err(AppError::validation(
            "recipes_limit must be a non-negative integer",
        )),
    }
}
