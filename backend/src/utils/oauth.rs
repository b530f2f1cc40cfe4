// src/utils/oauth.rs

//! Client side of the Microsoft authorization-code flow.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::{config::OAuthConfig, error::AppError};

/// Random bytes behind each `state` value (256 bits).
const STATE_BYTES: usize = 32;

/// Generates a fresh CSRF `state` token, URL-safe base64 without padding.
pub fn generate_state() -> String {
    let bytes: [u8; STATE_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the provider authorization URL the browser is redirected to.
pub fn authorize_url(config: &OAuthConfig, state: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(&config.auth_url)
        .map_err(|e| AppError::InternalServerError(format!("invalid auth url: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scope())
        .append_pair("state", state);

    Ok(url)
}

/// Successful token endpoint response; only the access token is used.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Error body returned by the token endpoint on a 4xx.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Exchanges an authorization code for an access token. No retries.
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<TokenResponse, AppError> {
    let scope = config.scope();
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", config.redirect_url.as_str()),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("scope", scope.as_str()),
    ];

    let response = http
        .post(&config.token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to exchange token: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let detail = match response.json::<TokenErrorResponse>().await {
            Ok(body) if body.error_description.is_empty() => body.error,
            Ok(body) => format!("{}: {}", body.error, body.error_description),
            Err(_) => status.to_string(),
        };
        return Err(AppError::Upstream(format!(
            "Failed to exchange token: {}",
            detail
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to exchange token: {}", e)))
}

/// Calls the profile endpoint with the access token.
///
/// Transport failures and non-2xx statuses are returned as `Err`; the body is
/// not read here.
pub async fn request_profile(
    http: &reqwest::Client,
    config: &OAuthConfig,
    access_token: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    http.get(&config.profile_url)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()
}

/// Reads a profile response body as a JSON object.
pub async fn read_profile(response: reqwest::Response) -> Result<Map<String, Value>, AppError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::InternalServerError(format!("Failed to read user data: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::InternalServerError(format!("Failed to parse user data: {}", e)))
}
