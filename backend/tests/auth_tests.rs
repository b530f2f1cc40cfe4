// tests/auth_tests.rs

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::{header::LOCATION, redirect::Policy};
use serde::Deserialize;
use serde_json::{Value, json};
use social_backend::{
    config::{Config, OAuthConfig},
    routes,
    state::AppState,
    utils::session::session_store,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use time::{Duration, OffsetDateTime};
use tower_sessions::{
    ExpiredDeletion, SessionStore,
    session::{Id, Record},
};
use tower_sessions_sqlx_store::SqliteStore;

/// Stand-in for the Microsoft token and Graph endpoints.
#[derive(Default)]
struct MockProvider {
    token_calls: AtomicUsize,
    /// `None` makes the profile endpoint answer 500.
    profile: Mutex<Option<Value>>,
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    code: String,
    client_id: String,
    client_secret: String,
}

async fn token(State(provider): State<Arc<MockProvider>>, Form(form): Form<TokenForm>) -> Response {
    provider.token_calls.fetch_add(1, Ordering::SeqCst);

    let valid = form.grant_type == "authorization_code"
        && form.code == "good-code"
        && form.client_id == "test-client"
        && form.client_secret == "test-secret";

    if valid {
        Json(json!({
            "access_token": "tok-123",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "bad code" })),
        )
            .into_response()
    }
}

async fn me(State(provider): State<Arc<MockProvider>>, headers: HeaderMap) -> Response {
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if bearer != Some("Bearer tok-123") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let profile = provider.profile.lock().unwrap().clone();
    match profile {
        Some(profile) => Json(profile).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn spawn_provider() -> (String, Arc<MockProvider>) {
    let provider = Arc::new(MockProvider::default());
    *provider.profile.lock().unwrap() = Some(json!({
        "id": "00000000-0000-0000-0000-000000000001",
        "displayName": "Ada Lovelace",
        "mail": "ada@contoso.com",
        "userPrincipalName": "ada@contoso.onmicrosoft.com",
    }));

    let app = Router::new()
        .route("/token", post(token))
        .route("/me", get(me))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, provider)
}

struct TestApp {
    address: String,
    pool: SqlitePool,
    provider: Arc<MockProvider>,
    provider_address: String,
}

async fn spawn_app(use_auth_callback: bool) -> TestApp {
    let (provider_address, provider) = spawn_provider().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let sessions = session_store(pool.clone())
        .await
        .expect("Failed to prepare session store");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        rust_log: "error".to_string(),
        port: 0,
        frontend_url: "http://localhost:5173".to_string(),
        use_auth_callback,
        cookie_secure: false,
        oauth: OAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_url: "http://127.0.0.1/auth/microsoft/callback".to_string(),
            auth_url: format!("{}/authorize", provider_address),
            token_url: format!("{}/token", provider_address),
            profile_url: format!("{}/me", provider_address),
        },
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        http: reqwest::Client::new(),
        sessions,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        provider,
        provider_address,
    }
}

/// Browser-like client: keeps cookies, does not follow redirects.
fn browser() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .unwrap()
}

fn location(response: &reqwest::Response) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_string()
}

/// Hits the login endpoint and returns the issued `state`.
async fn begin_login(app: &TestApp, client: &reqwest::Client) -> String {
    let response = client
        .get(format!("{}/auth/microsoft", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert!(response.status().is_redirection());

    let target = url::Url::parse(&location(&response)).unwrap();
    assert_eq!(
        format!("{}{}", &target[..url::Position::BeforePath], target.path()),
        format!("{}/authorize", app.provider_address)
    );

    target
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state missing from authorize URL")
}

async fn callback(
    app: &TestApp,
    client: &reqwest::Client,
    query: &[(&str, &str)],
) -> reqwest::Response {
    client
        .get(format!("{}/auth/microsoft/callback", app.address))
        .query(query)
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn login_redirect_carries_flow_parameters() {
    let app = spawn_app(false).await;
    let client = browser();

    let response = client
        .get(format!("{}/auth/microsoft", app.address))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let set_cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("session_id="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let target = url::Url::parse(&location(&response)).unwrap();
    let pairs: std::collections::HashMap<_, _> = target.query_pairs().into_owned().collect();
    assert_eq!(pairs["client_id"], "test-client");
    assert_eq!(pairs["response_type"], "code");
    assert_eq!(pairs["scope"], "openid profile email User.Read offline_access");
    assert!(pairs["state"].len() >= 43);
}

#[tokio::test]
async fn full_login_flow_creates_user_and_session() {
    // Arrange
    let app = spawn_app(false).await;
    let client = browser();

    // Unauthenticated before login
    let response = client
        .get(format!("{}/api/user", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Act
    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;

    // Assert
    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "http://localhost:5173/user");
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 1);

    let user: Value = client
        .get(format!("{}/api/user", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["email"], "ada@contoso.com");
    assert_eq!(user["username"], "Ada Lovelace");
    assert!(user["id"].as_i64().unwrap() > 0);

    // Second login resolves to the same account
    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;
    assert!(response.status().is_redirection());

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(users, 1);
}

#[tokio::test]
async fn state_is_single_use() {
    let app = spawn_app(false).await;
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;
    assert!(response.status().is_redirection());

    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auth_callback_redirect_and_username_fallback() {
    let app = spawn_app(true).await;
    *app.provider.profile.lock().unwrap() = Some(json!({
        "id": "abc",
        "userPrincipalName": "grace@contoso.com",
    }));
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;

    assert_eq!(location(&response), "http://localhost:5173/auth/callback");

    let user: Value = client
        .get(format!("{}/api/user", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["email"], "grace@contoso.com");
    assert_eq!(user["username"], "grace");
}

#[tokio::test]
async fn mismatched_state_is_rejected_before_exchange() {
    let app = spawn_app(false).await;
    let client = browser();

    begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", "forged")]).await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid OAuth state");
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn callback_without_issued_state_is_rejected() {
    let app = spawn_app(false).await;
    let client = browser();

    let response = callback(&app, &client, &[("code", "good-code"), ("state", "anything")]).await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_error_skips_exchange() {
    let app = spawn_app(false).await;
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(
        &app,
        &client,
        &[
            ("error", "access_denied"),
            ("error_description", "User cancelled"),
            ("code", "good-code"),
            ("state", &state),
        ],
    )
    .await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Authentication failed: access_denied");
    assert_eq!(body["description"], "User cancelled");
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_code_is_client_error() {
    let app = spawn_app(false).await;
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("state", &state)]).await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing authorization code");
}

#[tokio::test]
async fn failed_exchange_is_bad_gateway() {
    let app = spawn_app(false).await;
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "stale-code"), ("state", &state)]).await;

    assert_eq!(response.status().as_u16(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid_grant"));

    let response = client
        .get(format!("{}/api/user", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn failed_profile_fetch_redirects_to_login() {
    let app = spawn_app(false).await;
    *app.provider.profile.lock().unwrap() = None;
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/login?error=profile_fetch_failed");

    let response = client
        .get(format!("{}/login?error=profile_fetch_failed", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "profile_fetch_failed");
}

#[tokio::test]
async fn profile_without_identifier_is_server_error() {
    let app = spawn_app(false).await;
    *app.provider.profile.lock().unwrap() = Some(json!({ "displayName": "Ghost" }));
    let client = browser();

    let state = begin_login(&app, &client).await;
    let response = callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;

    assert_eq!(response.status().as_u16(), 500);
}

#[tokio::test]
async fn logout_clears_session() {
    let app = spawn_app(false).await;
    let client = browser();

    let state = begin_login(&app, &client).await;
    callback(&app, &client, &[("code", "good-code"), ("state", &state)]).await;

    let response = client
        .post(format!("{}/api/logout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "Logout endpoint");

    let response = client
        .get(format!("{}/api/user", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_page_and_stubs() {
    let app = spawn_app(false).await;
    let client = browser();

    let body: Value = client
        .get(format!("{}/login", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Please log in");

    let text = client
        .post(format!("{}/api/register", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "Register endpoint");

    let text = client
        .post(format!("{}/api/login", app.address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "Login endpoint");
}

async fn session_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tower_sessions")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn expired_sessions_are_purged() {
    let app = spawn_app(false).await;
    let client = browser();

    // Arrange: one live session from a login redirect, one long expired
    begin_login(&app, &client).await;

    let store = SqliteStore::new(app.pool.clone());
    let mut stale = Record {
        id: Id::default(),
        data: Default::default(),
        expiry_date: OffsetDateTime::now_utc() - Duration::hours(25),
    };
    store.create(&mut stale).await.unwrap();
    assert_eq!(session_rows(&app.pool).await, 2);

    // Act
    store.delete_expired().await.unwrap();

    // Assert: the live login session survives
    assert_eq!(session_rows(&app.pool).await, 1);
    assert!(store.load(&stale.id).await.unwrap().is_none());
}
