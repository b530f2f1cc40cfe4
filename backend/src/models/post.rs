use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub created_at: DateTime<Utc>,
    /// Unset until the first full or partial update.
    pub updated_at: Option<DateTime<Utc>>,

    pub likes: i64,
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[serde(default)]
    #[validate(range(min = 1, message = "Valid user_id is required"))]
    pub user_id: i64,

    #[serde(default)]
    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: String,

    pub image_url: Option<String>,
}

/// DTO for replacing a post (PUT).
///
/// Only the mutable fields are read; `id`, `user_id`, `created_at` and
/// `likes` in the body are ignored and kept from the stored row.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Content cannot be empty"))]
    pub content: String,

    pub image_url: Option<String>,
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// 1-based page number (default: 1).
    pub page: Option<i64>,

    /// Number of items per page (default: 10, max: 100).
    pub limit: Option<i64>,
}

impl PostListParams {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    /// Resolves defaults and bounds into `(limit, offset)`.
    pub fn window(&self) -> Result<(i64, i64), String> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(Self::DEFAULT_LIMIT);

        if limit > Self::MAX_LIMIT {
            return Err(format!("Limit cannot be greater than {}", Self::MAX_LIMIT));
        }
        if limit < 1 {
            return Err("Limit must be at least 1".to_string());
        }
        if page < 1 {
            return Err("Page must be at least 1".to_string());
        }

        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| "Page out of range".to_string())?;

        Ok((limit, offset))
    }
}

/// Keys a PATCH body can never change.
pub const PROTECTED_FIELDS: [&str; 3] = ["id", "user_id", "created_at"];

/// JSON type a mutable field accepts in a PATCH body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

impl FieldKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
        }
    }
}

/// One entry of the PATCH merge table.
pub struct MutableField {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Writes an already type-checked value into the post. Returns false when
    /// the value breaks a field invariant; the post is then left untouched.
    apply: fn(&mut Post, &Value) -> bool,
}

pub const MUTABLE_FIELDS: [MutableField; 3] = [
    MutableField {
        name: "content",
        kind: FieldKind::Text,
        apply: |post, value| match value.as_str() {
            Some(s) if !s.is_empty() => {
                post.content = s.to_string();
                true
            }
            _ => false,
        },
    },
    MutableField {
        name: "image_url",
        kind: FieldKind::Text,
        apply: |post, value| match value.as_str() {
            Some(s) => {
                post.image_url = Some(s.to_string());
                true
            }
            None => false,
        },
    },
    MutableField {
        name: "likes",
        kind: FieldKind::Number,
        // JSON numbers arrive as floats; fractions are truncated.
        apply: |post, value| match value.as_f64() {
            Some(n) if n.is_finite() && n >= 0.0 => {
                post.likes = n as i64;
                true
            }
            _ => false,
        },
    },
];

/// What a merge did with each key of the payload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub applied: Vec<&'static str>,
    pub protected: Vec<String>,
    /// Unknown keys and values of the wrong type.
    pub ignored: Vec<String>,
}

impl Post {
    /// Applies a PATCH body onto this post using [`MUTABLE_FIELDS`].
    ///
    /// Protected, unknown and mistyped keys are skipped without error.
    /// Does not touch `updated_at`; the caller stamps it.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for field in &MUTABLE_FIELDS {
            if let Some(value) = patch.get(field.name) {
                if field.kind.matches(value) && (field.apply)(self, value) {
                    outcome.applied.push(field.name);
                } else {
                    outcome.ignored.push(field.name.to_string());
                }
            }
        }

        for key in patch.keys() {
            if PROTECTED_FIELDS.contains(&key.as_str()) {
                outcome.protected.push(key.clone());
            } else if !MUTABLE_FIELDS.iter().any(|f| f.name == key.as_str()) {
                outcome.ignored.push(key.clone());
            }
        }

        outcome
    }
}
