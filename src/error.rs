use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum DBError {
    #[error("A user with this email is already registered")]
    AlreadyRegistered,

    #[error("Not Found")]
    NotFound,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Any error: {0:?}")]
    Anyhow(#[from] anyhow::Error),

    #[error("{0}")]
    DBError(#[from] DBError),

    #[error("Forbidden request: {0}")]
    Forbidden(&'static str),

    #[error("Authentication credentials were not provided or are invalid")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("SQL failed: {0:?}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO failed: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

/// Turns a unique-constraint violation into a validation error carrying
/// `message`; any other store failure passes through untouched.
pub fn on_conflict(err: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::validation(message);
        }
    }
    AppError::Sqlx(err)
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, Some(self.to_string())),
            AppError::Sqlx(_) | AppError::Anyhow(_) | AppError::Io(_) => {
                tracing::error!("request failed: {:?}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Unauthorized | AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, Some(self.to_string()))
            }
            AppError::Validation(_) | AppError::Invalid(_) => {
                (StatusCode::BAD_REQUEST, Some(self.to_string()))
            }
            AppError::DBError(db_error) => match db_error {
                DBError::NotFound => (StatusCode::NOT_FOUND, Some(self.to_string())),
                DBError::AlreadyRegistered => (StatusCode::BAD_REQUEST, Some(self.to_string())),
            },
        };

        let error = error_message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        });

        let body = match &self {
            AppError::Invalid(errors) => Json(json!({
                "error": error,
                "fields": field_messages(errors),
            })),
            _ => Json(json!({ "error": error })),
        };

        (status, body).into_response()
    }
}

fn field_messages(errors: &validator::ValidationErrors) -> serde_json::Value {
    let fields = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|err| {
                    err.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string())
                })
                .collect::<Vec<_>>();
            (field.to_string(), json!(messages))
        })
        .collect::<serde_json::Map<_, _>>();

    serde_json::Value::Object(fields)
}
