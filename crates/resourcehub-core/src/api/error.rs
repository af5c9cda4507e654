use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// A 401 that a token refresh could not recover from
    #[error("{0}")]
    AuthExpired(String),

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid OAuth callback: {0}")]
    OAuthCallback(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error bodies the backend sends, e.g. `{"error": "Invalid credentials"}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Message the server supplied in a JSON error body, if any.
    pub fn server_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        parsed
            .error
            .or(parsed.message)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
    }

    fn fallback_message(status: StatusCode) -> String {
        format!("Request failed with status {}", status.as_u16())
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::server_message(body).unwrap_or_else(|| Self::fallback_message(status));
        ApiError::Http { status, message }
    }

    /// The error surfaced when a 401 survives the refresh attempt.
    pub fn auth_expired(body: &str) -> Self {
        let message = Self::server_message(body)
            .unwrap_or_else(|| Self::fallback_message(StatusCode::UNAUTHORIZED));
        ApiError::AuthExpired(message)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::AuthExpired(_) => Some(StatusCode::UNAUTHORIZED),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
