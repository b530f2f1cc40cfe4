// src/handlers/auth.rs

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    error::AppError,
    models::user::{ProviderProfile, User},
    state::AppState,
    utils::{
        extract::QueryParams,
        oauth,
        session::{OAUTH_STATE_KEY, USER_ID_KEY},
    },
};

/// Starts the Microsoft login.
///
/// Stores a fresh `state` in the session and redirects to the provider's
/// authorization endpoint.
pub async fn microsoft_login(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let oauth_state = oauth::generate_state();
    session.insert(OAUTH_STATE_KEY, &oauth_state).await?;

    let auth_url = oauth::authorize_url(&state.config.oauth, &oauth_state)?;
    tracing::info!("Redirecting to: {}", auth_url);

    Ok(Redirect::to(auth_url.as_str()).into_response())
}

/// Query parameters the provider appends to the callback URL.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Completes the Microsoft login.
///
/// Verifies `state`, exchanges the code, resolves the profile to a local
/// user (creating one on first login) and stores the user id in the session.
pub async fn microsoft_callback(
    State(state): State<AppState>,
    session: Session,
    QueryParams(params): QueryParams<CallbackParams>,
) -> Result<Response, AppError> {
    // 1. Provider reported an error: stop here
    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        let description = params.error_description.unwrap_or_default();
        tracing::warn!("OAuth error from provider: {} - {}", error, description);
        return Err(AppError::Provider { error, description });
    }

    // 2. Code
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    // 3. State must match the one issued by `microsoft_login`
    let expected: Option<String> = session.get(OAUTH_STATE_KEY).await?;
    let received = params.state.unwrap_or_default();
    if received.is_empty() || expected.as_deref() != Some(received.as_str()) {
        tracing::warn!(
            "State mismatch. Expected present: {}, received present: {}",
            expected.is_some(),
            !received.is_empty()
        );
        return Err(AppError::BadRequest("Invalid OAuth state".to_string()));
    }
    session.remove::<String>(OAUTH_STATE_KEY).await?;

    // 4. Token exchange
    tracing::info!("Exchanging authorization code. Code length: {}", code.len());
    let token = oauth::exchange_code(&state.http, &state.config.oauth, &code).await?;

    // 5. Profile
    let response =
        match oauth::request_profile(&state.http, &state.config.oauth, &token.access_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to get user info: {}", e);
                return Ok(Redirect::to("/login?error=profile_fetch_failed").into_response());
            }
        };
    let profile = oauth::read_profile(response).await?;

    // 6. Identity
    let identity = ProviderProfile::from_json(&profile).ok_or_else(|| {
        AppError::InternalServerError("No identifier found in user info".to_string())
    })?;

    // 7. Local account
    let user = find_or_create_user(&state.pool, &identity).await?;

    // 8. Session
    session.insert(USER_ID_KEY, user.id).await?;
    session.cycle_id().await?;

    // 9. Back to the web client
    let redirect_url = state.config.login_redirect();
    tracing::info!("User {} logged in, redirecting to {}", user.id, redirect_url);

    Ok(Redirect::to(&redirect_url).into_response())
}

/// Looks up a user by email, creating one on first login.
pub async fn find_or_create_user(
    pool: &SqlitePool,
    identity: &ProviderProfile,
) -> Result<User, AppError> {
    let existing = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, created_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&identity.email)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to look up user by email: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if let Some(user) = existing {
        return Ok(user);
    }

    let username = identity.default_username();
    tracing::info!("Creating user '{}' for first login", username);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, created_at)
        VALUES (?, ?, ?)
        RETURNING id, username, email, created_at
        "#,
    )
    .bind(&username)
    .bind(&identity.email)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Error creating user: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(user)
}

/// Returns the logged-in user.
pub async fn current_user(
    State(pool): State<SqlitePool>,
    session: Session,
) -> Result<impl IntoResponse, AppError> {
    let user_id: i64 = session
        .get(USER_ID_KEY)
        .await?
        .ok_or(AppError::AuthError("Not authenticated".to_string()))?;

    // A row missing for a live session is reported like any other failure.
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, created_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| AppError::InternalServerError(format!("Failed to get user {}: {}", user_id, e)))?;

    Ok(Json(user))
}

pub async fn register() -> &'static str {
    "Register endpoint"
}

pub async fn login() -> &'static str {
    "Login endpoint"
}

/// Drops everything stored in the session.
pub async fn logout(session: Session) -> Result<&'static str, AppError> {
    session.flush().await?;
    Ok("Logout endpoint")
}

#[derive(Debug, Deserialize)]
pub struct LoginPageParams {
    pub error: Option<String>,
}

/// Landing page for failed logins; echoes `error` back as a 400.
pub async fn login_page(
    QueryParams(params): QueryParams<LoginPageParams>,
) -> impl IntoResponse {
    match params.error.filter(|e| !e.is_empty()) {
        Some(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))),
        None => (StatusCode::OK, Json(json!({ "message": "Please log in" }))),
    }
}

pub async fn index() -> &'static str {
    "Welcome to the API"
}
