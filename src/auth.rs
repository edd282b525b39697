use axum_extra::{
    headers::{authorization::Credentials, Authorization},
    TypedHeader,
};
use rand::Rng;
use sqlx::SqlitePool;

use crate::{
    db::{self, UserId},
    error::{AppError, AppResult},
};

pub type AuthHeader = Option<TypedHeader<Authorization<AuthToken>>>;

/// Opaque key sent as `Authorization: Token <key>`.
#[derive(Debug)]
pub struct AuthToken(pub String);

impl Credentials for AuthToken {
    const SCHEME: &'static str = "Token";

    fn decode(value: &axum::http::HeaderValue) -> Option<Self> {
        let mut it = value.to_str().ok()?.split_whitespace();
        let scheme = it.next()?;
        let token = it.next()?;

        if !scheme.eq_ignore_ascii_case(Self::SCHEME) || it.next().is_some() {
            None?
        }

        Some(Self(token.to_string()))
    }

    fn encode(&self) -> axum::http::HeaderValue {
        unreachable!()
    }
}

/// Resolves the caller, if any. A header carrying an unknown key is rejected
/// rather than treated as anonymous.
pub async fn viewer(pool: &SqlitePool, header: AuthHeader) -> AppResult<Option<UserId>> {
    let Some(TypedHeader(Authorization(token))) = header else {
        return Ok(None);
    };

    match db::user_for_token(pool, &token.0).await? {
        Some(user_id) => Ok(Some(user_id)),
        None => {
            tracing::warn!("rejected unknown auth token");
            Err(AppError::Unauthorized)
        }
    }
}

pub async fn require_user(pool: &SqlitePool, header: AuthHeader) -> AppResult<UserId> {
    viewer(pool, header).await?.ok_or(AppError::Unauthorized)
}

pub fn generate_token() -> String {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn hash_password(password: impl AsRef<[u8]>) -> AppResult<String> {
    let salt = password_hash::SaltString::generate(&mut rand::thread_rng());

    let hash =
        password_hash::PasswordHash::generate(argon2::Argon2::default(), password.as_ref(), &salt)
            .map_err(|err| anyhow::anyhow!(err))?
            .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: impl AsRef<[u8]>) -> AppResult<bool> {
    let hash = password_hash::PasswordHash::new(hash).map_err(|err| anyhow::anyhow!(err))?;

    match hash.verify_password(&[&argon2::Argon2::default()], password) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow::anyhow!(err).into()),
    }
}
