// src/config.rs

use std::env;
use dotenvy::dotenv;

const DEFAULT_AUTH_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";
const DEFAULT_TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const DEFAULT_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub port: u16,

    /// Base URL of the web client; login redirects land here.
    pub frontend_url: String,
    /// Redirect to `{frontend_url}/auth/callback` instead of `{frontend_url}/user`.
    pub use_auth_callback: bool,
    /// Mark the session cookie `Secure`. Off for plain-http development.
    pub cookie_secure: bool,

    pub oauth: OAuthConfig,
}

/// Microsoft identity platform registration and endpoints.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl OAuthConfig {
    pub const SCOPES: [&'static str; 5] =
        ["openid", "profile", "email", "User.Read", "offline_access"];

    pub fn scope(&self) -> String {
        Self::SCOPES.join(" ")
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://app.db?mode=rwc".to_string());

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let frontend_url = env::var("FRONTEND_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "http://localhost:5173".to_string());

        let use_auth_callback = env::var("USE_AUTH_CALLBACK")
            .map(|v| v == "true")
            .unwrap_or(false);

        let cookie_secure = env::var("COOKIE_SECURE")
            .map(|v| v == "true")
            .unwrap_or(false);

        let oauth = OAuthConfig {
            client_id: env::var("MICROSOFT_CLIENT_ID")
                .expect("MICROSOFT_CLIENT_ID must be set"),
            client_secret: env::var("MICROSOFT_CLIENT_SECRET")
                .expect("MICROSOFT_CLIENT_SECRET must be set"),
            redirect_url: env::var("MICROSOFT_REDIRECT_URL")
                .expect("MICROSOFT_REDIRECT_URL must be set"),
            auth_url: env::var("MICROSOFT_AUTH_URL")
                .unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            token_url: env::var("MICROSOFT_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            profile_url: env::var("MICROSOFT_PROFILE_URL")
                .unwrap_or_else(|_| DEFAULT_PROFILE_URL.to_string()),
        };

        Self {
            database_url,
            rust_log,
            port,
            frontend_url,
            use_auth_callback,
            cookie_secure,
            oauth,
        }
    }

    /// Where the browser is sent after a successful login.
    pub fn login_redirect(&self) -> String {
        let base = self.frontend_url.trim_end_matches('/');
        if self.use_auth_callback {
            format!("{}/auth/callback", base)
        } else {
            format!("{}/user", base)
        }
    }
}
