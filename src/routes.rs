use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    BoxError, Json, Router,
};
use serde_json::json;
use std::time::Duration;
use tower::{buffer::BufferLayer, limit::RateLimitLayer, ServiceBuilder};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    api,
    db::{Favorite, ShoppingCartItem},
    AppState,
};

pub fn generate_routes(state: AppState) -> Router {
    let media_url = state.config.media_url.clone();
    let media_root = state.images.root().clone();
    let rate_limit = state.config.rate_limit_per_sec;

    let mut router = Router::new()
        // ==== AUTH ==== //
        .route("/api/auth/token/login", post(api::auth::login))
        .route("/api/auth/token/logout", post(api::auth::logout))
        // ==== USERS ==== //
        .route(
            "/api/users",
            get(api::user::list_users).post(api::user::registration),
        )
        .route("/api/users/me", get(api::user::get_current_user))
        .route("/api/users/set_password", post(api::user::set_password))
        .route("/api/users/subscriptions", get(api::user::subscriptions))
        .route("/api/users/:id", get(api::user::get_user))
        .route(
            "/api/users/:id/subscribe",
            post(api::user::subscribe).delete(api::user::unsubscribe),
        )
        // ==== TAGS & INGREDIENTS ==== //
        .route("/api/tags", get(api::tags::get_tags))
        .route("/api/tags/:id", get(api::tags::get_tag))
        .route("/api/ingredients", get(api::ingredients::get_ingredients))
        .route("/api/ingredients/:id", get(api::ingredients::get_ingredient))
        // ==== RECIPES ==== //
        .route(
            "/api/recipes",
            get(api::recipes::get_recipes).post(api::recipes::create_recipe),
        )
        .route(
            "/api/recipes/download_shopping_cart",
            get(api::recipes::download_shopping_cart),
        )
        .route(
            "/api/recipes/:id",
            get(api::recipes::get_recipe)
                .patch(api::recipes::update_recipe)
                .delete(api::recipes::delete_recipe),
        )
        .route(
            "/api/recipes/:id/favorite",
            post(api::recipes::add_marker::<Favorite>)
                .delete(api::recipes::remove_marker::<Favorite>),
        )
        .route(
            "/api/recipes/:id/shopping_cart",
            post(api::recipes::add_marker::<ShoppingCartItem>)
                .delete(api::recipes::remove_marker::<ShoppingCartItem>),
        )
        .fallback(handler_404)
        .with_state(state);

    if media_url.starts_with('/') && media_url.len() > 1 {
        router = router.nest_service(&media_url, ServeDir::new(media_root));
    }

    let router = router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    if rate_limit == 0 {
        return router;
    }

    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(|err: BoxError| async move {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Unhandled error: {}", err),
                )
            }))
            .layer(BufferLayer::new(1024))
            .layer(RateLimitLayer::new(rate_limit, Duration::from_secs(1))),
    )
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "nothing to see here" })),
    )
}
