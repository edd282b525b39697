pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod image;
pub mod pagination;
pub mod routes;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::{config::Config, image::ImageStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub images: ImageStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let images = ImageStore::new(config.media_root.clone(), config.media_url.clone());
        Self {
            pool,
            config: Arc::new(config),
            images,
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(app_state: &AppState) -> SqlitePool {
        app_state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(app_state: &AppState) -> Arc<Config> {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for ImageStore {
    fn from_ref(app_state: &AppState) -> ImageStore {
        app_state.images.clone()
    }
}
