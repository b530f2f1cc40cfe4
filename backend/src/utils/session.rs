// src/utils/session.rs

//! Cookie session configuration and the keys stored in it.
//!
//! Sessions live in the `tower_sessions` table of the application database.
//! Expired rows are purged by a background task started from `main`.

use sqlx::SqlitePool;
use time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer, cookie::SameSite};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::Config;

pub const SESSION_COOKIE: &str = "session_id";

/// CSRF token issued by the login redirect, checked by the callback.
pub const OAUTH_STATE_KEY: &str = "oauth_state";

/// Id of the logged-in user.
pub const USER_ID_KEY: &str = "user_id";

/// How often expired sessions are deleted.
pub const EXPIRED_DELETION_PERIOD: std::time::Duration = std::time::Duration::from_secs(60);

/// Opens the session store on the application pool, creating its table.
pub async fn session_store(pool: SqlitePool) -> Result<SqliteStore, sqlx::Error> {
    let store = SqliteStore::new(pool);
    store.migrate().await?;
    Ok(store)
}

/// Session layer: HTTP-only `Lax` cookie on `/`, 24 hours of inactivity.
pub fn session_layer(store: SqliteStore, config: &Config) -> SessionManagerLayer<SqliteStore> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_path("/")
        .with_secure(config.cookie_secure)
        .with_expiry(Expiry::OnInactivity(Duration::hours(24)))
}
