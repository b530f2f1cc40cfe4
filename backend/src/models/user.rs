// src/models/user.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub username: String,

    /// Identity key resolved from the Microsoft profile. Unique.
    pub email: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The subset of a Microsoft Graph `/me` document used to identify a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// First of `mail`, `userPrincipalName`, `id` present as a string.
    pub email: String,
    pub display_name: Option<String>,
}

impl ProviderProfile {
    /// Extracts the identity from a raw profile object.
    /// Returns `None` when no usable identifier is present.
    pub fn from_json(profile: &Map<String, Value>) -> Option<Self> {
        let email = ["mail", "userPrincipalName", "id"]
            .iter()
            .find_map(|key| profile.get(*key).and_then(Value::as_str))?
            .to_string();

        let display_name = profile
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Some(Self { email, display_name })
    }

    /// Username for a first-time login: display name, else the email's
    /// local part, else the whole identifier.
    pub fn default_username(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        match self.email.find('@') {
            Some(idx) if idx > 0 => self.email[..idx].to_string(),
            _ => self.email.clone(),
        }
    }
}
