//! User identity as returned by the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile returned by the backend on login.
///
/// The shape belongs to the backend, so the profile is kept as raw JSON and
/// never validated. Accessors return `None` when a field is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Value);

impl UserProfile {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    /// The user's id, which backends send as either a string or a number.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id").or_else(|| self.0.get("_id"))? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.0.get("username").and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    /// Best label for display: username, then email, then id.
    pub fn display_name(&self) -> String {
        self.username()
            .or_else(|| self.email())
            .map(str::to_string)
            .or_else(|| self.id())
            .unwrap_or_else(|| "unknown user".to_string())
    }
}

impl From<Value> for UserProfile {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Token pair issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}
