use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    auth::{self, AuthHeader},
    db,
    error::{AppError, AppResult},
};

// ================================================= LOGIN ================================================= //

#[derive(Debug, Deserialize, Validate)]
pub struct Login {
    #[validate(
        email(message = "invalid email address"),
        length(min = 1, message = "email can't be blank")
    )]
    email: String,
    #[validate(length(min = 1, message = "password can't be blank"))]
    password: String,
}

// POST /api/auth/token/login
pub async fn login(
    State(pool): State<SqlitePool>,
    Json(user): Json<Login>,
) -> AppResult<impl IntoResponse> {
    user.validate()?;

    let Some(user_auth) = db::find_auth_by_email(&pool, &user.email).await? else {
        tracing::warn!("login attempt for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !auth::verify_password(&user_auth.hash, &user.password)? {
        tracing::warn!(user_id = user_auth.id, "login attempt with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = db::get_or_create_token(&pool, user_auth.id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "auth_token": token }))))
}

// ================================================= LOGOUT ================================================= //

// POST /api/auth/token/logout
pub async fn logout(
    State(pool): State<SqlitePool>,
    token: AuthHeader,
) -> AppResult<impl IntoResponse> {
    let user_id = auth::require_user(&pool, token).await?;
    db::delete_token(&pool, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
