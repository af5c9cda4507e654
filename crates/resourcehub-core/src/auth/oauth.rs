//! OAuth sign-in through the backend's Google and GitHub redirects.
//!
//! The backend finishes the provider dance and redirects to
//! `/oauth-callback?accessToken=..&refreshToken=..&user=..`, where `user` is
//! URL-encoded JSON.

use url::Url;

use crate::api::request::endpoint;
use crate::api::{ApiError, Result};
use crate::models::{AuthTokens, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Some(OAuthProvider::Google),
            "github" => Some(OAuthProvider::GitHub),
            _ => None,
        }
    }

    /// Where to send the browser to start signing in.
    pub fn authorize_url(&self, base_url: &str) -> String {
        endpoint(base_url, &format!("/auth/{}", self.as_str()))
    }
}

/// Tokens and user carried by the completion redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthCallback {
    pub tokens: AuthTokens,
    pub user: UserProfile,
}

impl OAuthCallback {
    pub fn parse(callback_url: &str) -> Result<Self> {
        let url = Url::parse(callback_url.trim())
            .map_err(|e| ApiError::OAuthCallback(format!("not a URL: {}", e)))?;

        let mut access_token = None;
        let mut refresh_token = None;
        let mut raw_user = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "accessToken" => access_token = Some(value.into_owned()),
                "refreshToken" => refresh_token = Some(value.into_owned()),
                "user" => raw_user = Some(value.into_owned()),
                _ => {}
            }
        }

        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::OAuthCallback("missing accessToken".to_string()))?;
        let raw_user = raw_user
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::OAuthCallback("missing user".to_string()))?;
        let user: UserProfile = serde_json::from_str(&raw_user)
            .map_err(|e| ApiError::OAuthCallback(format!("user is not valid JSON: {}", e)))?;

        Ok(Self {
            tokens: AuthTokens {
                access_token,
                refresh_token: refresh_token.unwrap_or_default(),
            },
            user,
        })
    }
}
