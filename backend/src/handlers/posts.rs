// src/handlers/posts.rs

use axum::{
    Json,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::post::{CreatePostRequest, Post, PostListParams, UpdatePostRequest},
    utils::extract::{JsonBody, PostTarget, query_params},
};

/// Error for a mutation addressed to the whole collection.
fn collection_error(method: &Method) -> AppError {
    let verb = match *method {
        Method::PUT => "update",
        Method::PATCH => "patch",
        Method::DELETE => "delete",
        _ => "modify",
    };
    AppError::MethodNotAllowed(format!("Cannot {} entire collection", verb))
}

/// PUT / PATCH / DELETE on `/posts`.
/// Answers before the body is read.
pub async fn reject_collection(method: Method) -> AppError {
    collection_error(&method)
}

async fn fetch_post(pool: &SqlitePool, id: i64) -> Result<Post, AppError> {
    sqlx::query_as::<_, Post>(
        r#"
        SELECT id, user_id, content, image_url, created_at, updated_at, likes
        FROM posts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Database query error loading post {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// GET on `/posts` (paged list) or `/posts/{id}` (one post).
/// The query string is only read for the list.
pub async fn get_posts(
    State(pool): State<SqlitePool>,
    target: PostTarget,
    uri: Uri,
) -> Result<Response, AppError> {
    match target {
        PostTarget::Collection => {
            let params: PostListParams = query_params(&uri)?;
            list_posts(&pool, &params).await
        }
        PostTarget::Item(id) => Ok(Json(fetch_post(&pool, id).await?).into_response()),
    }
}

/// List posts, newest first, with the total row count.
async fn list_posts(pool: &SqlitePool, params: &PostListParams) -> Result<Response, AppError> {
    let (limit, offset) = params.window().map_err(AppError::BadRequest)?;

    let posts = sqlx::query_as::<_, Post>(
        r#"
        SELECT id, user_id, content, image_url, created_at, updated_at, likes
        FROM posts
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list posts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    // Separate statement; may drift from the page under concurrent writes.
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(id) FROM posts")
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Count query error: {:?}", e);
            0
        });

    Ok(Json(json!({
        "status": "success",
        "count": count,
        "data": posts,
    }))
    .into_response())
}

/// Create a new post for an existing user.
pub async fn create_post(
    State(pool): State<SqlitePool>,
    JsonBody(payload): JsonBody<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    // 2. Author must exist
    let author = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
        .bind(payload.user_id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Error checking if user exists: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if author.is_none() {
        return Err(AppError::BadRequest("User not found".to_string()));
    }

    // 3. Insert Post
    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (user_id, content, image_url, created_at, updated_at, likes)
        VALUES (?, ?, ?, ?, NULL, 0)
        RETURNING id, user_id, content, image_url, created_at, updated_at, likes
        "#,
    )
    .bind(payload.user_id)
    .bind(&payload.content)
    .bind(&payload.image_url)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!(
            "Error inserting post (user_id={}): {:?}",
            payload.user_id,
            e
        );
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": post,
        })),
    ))
}

/// Replace a post's content and image.
/// `id`, `user_id`, `created_at` and `likes` always come from the stored row.
pub async fn update_post(
    State(pool): State<SqlitePool>,
    target: PostTarget,
    JsonBody(payload): JsonBody<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = target.id().ok_or_else(|| collection_error(&Method::PUT))?;

    let mut post = fetch_post(&pool, id).await?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    post.content = payload.content;
    post.image_url = payload.image_url;
    post.updated_at = Some(Utc::now());

    sqlx::query(
        r#"
        UPDATE posts
        SET content = ?, image_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.content)
    .bind(&post.image_url)
    .bind(post.updated_at)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Database update error for post {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(post))
}

/// Merge a JSON object onto a post.
///
/// Only `content`, `image_url` and `likes` can change; anything else in the
/// body is skipped silently. The whole mutable field set is written back, so
/// concurrent patches on one post are last-writer-wins.
pub async fn patch_post(
    State(pool): State<SqlitePool>,
    target: PostTarget,
    JsonBody(patch): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse, AppError> {
    let id = target.id().ok_or_else(|| collection_error(&Method::PATCH))?;

    let mut post = fetch_post(&pool, id).await?;

    let outcome = post.merge(&patch);
    if !outcome.protected.is_empty() || !outcome.ignored.is_empty() {
        tracing::debug!(
            "PATCH post {}: applied {:?}, protected {:?}, ignored {:?}",
            id,
            outcome.applied,
            outcome.protected,
            outcome.ignored
        );
    }

    post.updated_at = Some(Utc::now());

    sqlx::query(
        r#"
        UPDATE posts
        SET content = ?, image_url = ?, updated_at = ?, likes = ?
        WHERE id = ?
        "#,
    )
    .bind(&post.content)
    .bind(&post.image_url)
    .bind(post.updated_at)
    .bind(post.likes)
    .bind(id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Database update error for post {}: {:?}", id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(post))
}

/// Delete a post and its likes.
pub async fn delete_post(
    State(pool): State<SqlitePool>,
    target: PostTarget,
) -> Result<impl IntoResponse, AppError> {
    let id = target.id().ok_or_else(|| collection_error(&Method::DELETE))?;

    // Likes first; a failure here only gets logged.
    if let Err(e) = sqlx::query("DELETE FROM likes WHERE post_id = ?")
        .bind(id)
        .execute(&pool)
        .await
    {
        tracing::error!("Error deleting likes of post {}: {:?}", id, e);
    }

    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post {}: {:?}", id, e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    Ok(Json(json!({
        "status": "success",
        "id": id,
    })))
}
