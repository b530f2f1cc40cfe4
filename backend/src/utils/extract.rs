// src/utils/extract.rs

//! Extractors that report failures through `AppError`'s JSON envelope.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection},
    http::{Uri, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json<T>` whose rejection is a 400 `{"error": ...}`.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            AppError::BadRequest(format!("Invalid request payload: {}", rejection.body_text()))
        })?;
        Ok(Self(value))
    }
}

/// `Query<T>` whose rejection is a 400 `{"error": ...}`.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        query_params(&parts.uri).map(Self)
    }
}

/// Parses the query string of `uri`; failures are a 400 `{"error": ...}`.
///
/// Called by handlers that only read the query on some paths.
pub fn query_params<T: DeserializeOwned>(uri: &Uri) -> Result<T, AppError> {
    let Query(value) = Query::<T>::try_from_uri(uri)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    Ok(value)
}

/// What a `/posts...` request path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTarget {
    Collection,
    Item(i64),
}

impl PostTarget {
    /// Lexical extraction: `/posts` and `/posts/` are the collection,
    /// otherwise the segment after `posts` is the id.
    pub fn from_path(path: &str) -> Result<Self, AppError> {
        if path == "/posts" || path == "/posts/" {
            return Ok(Self::Collection);
        }

        let segments: Vec<&str> = path.split('/').collect();
        let id_part = segments
            .windows(2)
            .find(|pair| pair[0] == "posts")
            .map(|pair| pair[1])
            .unwrap_or("");

        if id_part.is_empty() {
            return Ok(Self::Collection);
        }

        id_part
            .parse::<i64>()
            .map(Self::Item)
            .map_err(|_| AppError::BadRequest(format!("Invalid post ID: {}", id_part)))
    }

    pub fn id(self) -> Option<i64> {
        match self {
            Self::Collection => None,
            Self::Item(id) => Some(id),
        }
    }
}

impl<S> FromRequestParts<S> for PostTarget
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_path(parts.uri.path())
    }
}
