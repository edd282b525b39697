//! End-to-end tests driving the full router against an in-memory database.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tower::ServiceExt;

use foodgram::{config::Config, db, routes, AppState};

const IMAGE: &str = "data:image/png;base64,iVBORw0KGgpoZWxsbw==";
const FOOTER: &str = "\n\n-- foodgram";

struct TestApp {
    router: Router,
    media: TempDir,
}

impl TestApp {
    fn stored_images(&self) -> usize {
        std::fs::read_dir(self.media.path().join("recipes/images"))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }
}

async fn setup() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open database");
    db::prepare_db(&pool).await.expect("Failed to prepare schema");

    let media = tempfile::tempdir().expect("Failed to create media dir");
    let catalog = media.path().join("ingredients.json");
    std::fs::write(
        &catalog,
        json!([
            {"name": "flour", "measurement_unit": "g"},
            {"name": "milk", "measurement_unit": "ml"},
            {"name": "salt", "measurement_unit": "g"},
        ])
        .to_string(),
    )
    .unwrap();
    db::import_ingredients(&pool, &catalog).await.unwrap();

    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        media_root: media.path().to_path_buf(),
        media_url: "/media".to_string(),
        page_size: 6,
        shopping_list_footer: FOOTER.to_string(),
        ingredients_file: None,
        rate_limit_per_sec: 0,
    };

    TestApp {
        router: routes::generate_routes(AppState::new(pool, config)),
        media,
    }
}

/// Sends one request and returns the status and raw body.
async fn send(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Token {token}"));
    }

    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec(), headers)
}

async fn make_request(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes, _) = send(app, method, path, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers a user and logs them in, returning `(id, token)`.
async fn sign_up(app: &TestApp, name: &str) -> (i64, String) {
    let (status, user) = make_request(
        app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({
            "email": format!("{name}@example.com"),
            "username": name,
            "first_name": "Test",
            "last_name": "Cook",
            "password": "correct-horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");

    let (status, login) = make_request(
        app,
        Method::POST,
        "/api/auth/token/login",
        None,
        Some(json!({"email": format!("{name}@example.com"), "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (
        user["id"].as_i64().unwrap(),
        login["auth_token"].as_str().unwrap().to_string(),
    )
}

async fn tag_id(app: &TestApp, slug: &str) -> i64 {
    let (_, tags) = make_request(app, Method::GET, "/api/tags", None, None).await;
    tags.as_array()
        .unwrap()
        .iter()
        .find(|tag| tag["slug"] == slug)
        .and_then(|tag| tag["id"].as_i64())
        .unwrap()
}

async fn ingredient_id(app: &TestApp, name: &str) -> i64 {
    let path = format!("/api/ingredients?name={name}");
    let (_, found) = make_request(app, Method::GET, &path, None, None).await;
    found[0]["id"].as_i64().unwrap()
}

async fn create_recipe(app: &TestApp, token: &str, body: Value) -> Value {
    let (status, recipe) =
        make_request(app, Method::POST, "/api/recipes", Some(token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{recipe}");
    recipe
}

async fn pancakes(app: &TestApp, token: &str) -> Value {
    let body = json!({
        "name": "Pancakes",
        "text": "Mix and fry",
        "cooking_time": 15,
        "image": IMAGE,
        "tags": [tag_id(app, "breakfast").await],
        "ingredients": [
            {"id": ingredient_id(app, "flour").await, "amount": 200},
            {"id": ingredient_id(app, "milk").await, "amount": 100},
        ],
    });
    create_recipe(app, token, body).await
}

#[tokio::test]
async fn signup_login_and_logout() {
    let app = setup().await;
    let (id, token) = sign_up(&app, "alice").await;

    let (status, me) = make_request(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
    assert_eq!(me["is_subscribed"], false);

    let (status, _) = make_request(&app, Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        make_request(&app, Method::POST, "/api/auth/token/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = make_request(&app, Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_email_and_bad_login_are_rejected() {
    let app = setup().await;
    sign_up(&app, "alice").await;

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({
            "email": "alice@example.com",
            "username": "other",
            "first_name": "A",
            "last_name": "B",
            "password": "correct-horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/auth/token/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn set_password_checks_current_password() {
    let app = setup().await;
    let (_, token) = sign_up(&app, "alice").await;

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/users/set_password",
        Some(&token),
        Some(json!({"current_password": "nope-nope", "new_password": "battery-staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/users/set_password",
        Some(&token),
        Some(json!({"current_password": "correct-horse", "new_password": "battery-staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/api/auth/token/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "battery-staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn recipe_lifecycle_respects_authorship() {
    let app = setup().await;
    let (alice_id, alice) = sign_up(&app, "alice").await;
    let (_, bob) = sign_up(&app, "bob").await;

    let recipe = pancakes(&app, &alice).await;
    let id = recipe["id"].as_i64().unwrap();
    assert_eq!(recipe["author"]["id"], alice_id);
    assert_eq!(recipe["tags"][0]["slug"], "breakfast");
    assert_eq!(recipe["ingredients"].as_array().unwrap().len(), 2);
    assert!(recipe["image"]
        .as_str()
        .unwrap()
        .starts_with("/media/recipes/images/"));

    let path = format!("/api/recipes/{id}");
    let (status, _) = make_request(
        &app,
        Method::PATCH,
        &path,
        Some(&bob),
        Some(json!({"name": "Stolen"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        make_request(&app, Method::PATCH, &path, None, Some(json!({"name": "Anon"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, updated) = make_request(
        &app,
        Method::PATCH,
        &path,
        Some(&alice),
        Some(json!({
            "name": "Crepes",
            "ingredients": [{"id": ingredient_id(&app, "salt").await, "amount": 2}],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Crepes");
    assert_eq!(updated["text"], "Mix and fry");
    assert_eq!(updated["ingredients"][0]["name"], "salt");
    assert_eq!(updated["tags"][0]["slug"], "breakfast");

    let (status, _) = make_request(&app, Method::DELETE, &path, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = make_request(&app, Method::DELETE, &path, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = make_request(&app, Method::GET, &path, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_recipes_are_rejected() {
    let app = setup().await;
    let (_, token) = sign_up(&app, "alice").await;
    let flour = ingredient_id(&app, "flour").await;
    let lunch = tag_id(&app, "lunch").await;

    let base = json!({
        "name": "Bread",
        "text": "Bake",
        "cooking_time": 60,
        "image": IMAGE,
        "tags": [lunch],
        "ingredients": [{"id": flour, "amount": 500}],
    });

    let broken = [
        ("cooking_time", json!(0)),
        ("tags", json!([])),
        ("ingredients", json!([])),
        ("ingredients", json!([{"id": flour, "amount": 1}, {"id": flour, "amount": 2}])),
        ("ingredients", json!([{"id": flour, "amount": 0}])),
        ("ingredients", json!([{"id": 9999, "amount": 1}])),
        ("tags", json!([9999])),
        ("image", json!("not an image")),
        (
            "image",
            json!("data:image/html;base64,PHNjcmlwdD5hbGVydCgxKTwvc2NyaXB0Pg=="),
        ),
        ("name", json!("")),
    ];

    for (field, value) in broken {
        let mut body = base.clone();
        body[field] = value.clone();
        let (status, _) =
            make_request(&app, Method::POST, "/api/recipes", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{field} = {value}");
    }

    let (_, listing) = make_request(&app, Method::GET, "/api/recipes", None, None).await;
    assert_eq!(listing["count"], 0);
    assert_eq!(app.stored_images(), 0, "rejected recipes leave no image files");
}

#[tokio::test]
async fn failed_update_discards_new_image() {
    let app = setup().await;
    let (_, token) = sign_up(&app, "alice").await;
    let id = pancakes(&app, &token).await["id"].as_i64().unwrap();
    assert_eq!(app.stored_images(), 1);

    let path = format!("/api/recipes/{id}");
    let (status, _) = make_request(
        &app,
        Method::PATCH,
        &path,
        Some(&token),
        Some(json!({"image": IMAGE, "tags": [9999]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_images(), 1);
}

#[tokio::test]
async fn stored_images_are_served_as_images() {
    let app = setup().await;
    let (_, token) = sign_up(&app, "alice").await;
    let recipe = pancakes(&app, &token).await;

    let url = recipe["image"].as_str().unwrap();
    let (status, bytes, headers) = send(&app, Method::GET, url, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert!(bytes.ends_with(b"hello"));
}

#[tokio::test]
async fn listing_flags_and_filters() {
    let app = setup().await;
    let (alice_id, alice) = sign_up(&app, "alice").await;
    let (_, bob) = sign_up(&app, "bob").await;

    let breakfast = pancakes(&app, &alice).await["id"].as_i64().unwrap();
    let dinner = create_recipe(
        &app,
        &bob,
        json!({
            "name": "Stew",
            "text": "Simmer",
            "cooking_time": 90,
            "image": IMAGE,
            "tags": [tag_id(&app, "dinner").await],
            "ingredients": [{"id": ingredient_id(&app, "salt").await, "amount": 5}],
        }),
    )
    .await["id"]
        .as_i64()
        .unwrap();

    let favorite = format!("/api/recipes/{dinner}/favorite");
    let (status, summary) = make_request(&app, Method::POST, &favorite, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(summary["name"], "Stew");
    assert!(summary.get("author_id").is_none());

    let (status, _) = make_request(&app, Method::POST, &favorite, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listing) = make_request(&app, Method::GET, "/api/recipes", Some(&alice), None).await;
    assert_eq!(listing["count"], 2);
    // newest first
    assert_eq!(listing["results"][0]["id"], dinner);
    assert_eq!(listing["results"][0]["is_favorited"], true);
    assert_eq!(listing["results"][1]["is_favorited"], false);

    let (_, anonymous) = make_request(&app, Method::GET, "/api/recipes", None, None).await;
    assert_eq!(anonymous["results"][0]["is_favorited"], false);

    let (_, favorites) = make_request(
        &app,
        Method::GET,
        "/api/recipes?is_favorited=1",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(favorites["count"], 1);
    assert_eq!(favorites["results"][0]["id"], dinner);

    let (_, tagged) = make_request(
        &app,
        Method::GET,
        "/api/recipes?tags=breakfast&tags=lunch",
        None,
        None,
    )
    .await;
    assert_eq!(tagged["count"], 1);
    assert_eq!(tagged["results"][0]["id"], breakfast);

    let path = format!("/api/recipes?author={alice_id}");
    let (_, by_author) = make_request(&app, Method::GET, &path, None, None).await;
    assert_eq!(by_author["count"], 1);

    let (status, _) =
        make_request(&app, Method::GET, "/api/recipes?author=alice", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, paged) = make_request(&app, Method::GET, "/api/recipes?limit=1", None, None).await;
    assert_eq!(paged["results"].as_array().unwrap().len(), 1);
    assert!(paged["next"].as_str().unwrap().contains("page=2"));
    assert!(paged["previous"].is_null());

    let (status, _) = make_request(&app, Method::GET, "/api/recipes?page=9", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let huge = "/api/recipes?page=9223372036854775807";
    let (status, _) = make_request(&app, Method::GET, huge, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, wide) = make_request(
        &app,
        Method::GET,
        "/api/recipes?limit=9223372036854775807",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wide["count"], 2);

    for _ in 0..2 {
        let (status, _) = make_request(&app, Method::DELETE, &favorite, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let missing = "/api/recipes/9999/shopping_cart";
    let (status, _) = make_request(&app, Method::POST, missing, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shopping_cart_download_sums_ingredients() {
    let app = setup().await;
    let (_, token) = sign_up(&app, "alice").await;
    let first = pancakes(&app, &token).await["id"].as_i64().unwrap();
    let second = create_recipe(
        &app,
        &token,
        json!({
            "name": "Bread",
            "text": "Bake",
            "cooking_time": 60,
            "image": IMAGE,
            "tags": [tag_id(&app, "lunch").await],
            "ingredients": [{"id": ingredient_id(&app, "flour").await, "amount": 100}],
        }),
    )
    .await["id"]
        .as_i64()
        .unwrap();

    for id in [first, second] {
        let path = format!("/api/recipes/{id}/shopping_cart");
        let (status, _) = make_request(&app, Method::POST, &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, bytes, headers) = send(
        &app,
        Method::GET,
        "/api/recipes/download_shopping_cart",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("attachment"));

    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text, format!("flour - 300 g\nmilk - 100 ml{FOOTER}"));

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/api/recipes/download_shopping_cart",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn subscriptions_flow() {
    let app = setup().await;
    let (alice_id, alice) = sign_up(&app, "alice").await;
    let (bob_id, bob) = sign_up(&app, "bob").await;
    for _ in 0..3 {
        pancakes(&app, &bob).await;
    }

    let subscribe = format!("/api/users/{bob_id}/subscribe");
    let (status, author) = make_request(&app, Method::POST, &subscribe, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(author["is_subscribed"], true);

    let (status, _) = make_request(&app, Method::POST, &subscribe, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let own = format!("/api/users/{alice_id}/subscribe");
    let (status, _) = make_request(&app, Method::POST, &own, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        make_request(&app, Method::POST, "/api/users/9999/subscribe", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, feed) = make_request(
        &app,
        Method::GET,
        "/api/users/subscriptions?recipes_limit=2",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed["count"], 1);
    assert_eq!(feed["results"][0]["id"], bob_id);
    assert_eq!(feed["results"][0]["recipes_count"], 3);
    assert_eq!(feed["results"][0]["recipes"].as_array().unwrap().len(), 2);

    let (status, _) = make_request(
        &app,
        Method::GET,
        "/api/users/subscriptions?recipes_limit=-1",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!("/api/users/{alice_id}");
    let (_, seen_by_bob) = make_request(&app, Method::GET, &path, Some(&bob), None).await;
    assert_eq!(seen_by_bob["is_subscribed"], false);

    for _ in 0..2 {
        let (status, _) =
            make_request(&app, Method::DELETE, &subscribe, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, feed) = make_request(
        &app,
        Method::GET,
        "/api/users/subscriptions",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(feed["count"], 0);
}

#[tokio::test]
async fn catalog_lookups() {
    let app = setup().await;

    let (_, tags) = make_request(&app, Method::GET, "/api/tags", None, None).await;
    assert_eq!(tags.as_array().unwrap().len(), 3);

    let (status, _) = make_request(&app, Method::GET, "/api/tags/9999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, found) = make_request(&app, Method::GET, "/api/ingredients?name=FL", None, None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["measurement_unit"], "g");

    let (status, _) = make_request(&app, Method::GET, "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
