//! Authentication endpoints: password login, registration and OAuth.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::client::ApiClient;
use super::error::{ApiError, Result};
use super::request::ApiRequest;
use crate::auth::OAuthProvider;
use crate::models::{AuthTokens, UserProfile};

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
    remember: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: UserProfile,
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Fields of the sign-up form.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    /// Checks that run before anything is sent to the backend.
    pub fn validate(&self) -> Result<()> {
        if self.password != self.confirm_password {
            return Err(ApiError::Validation("Passwords do not match".to_string()));
        }
        if self.username.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::Validation("All fields are required".to_string()));
        }
        Ok(())
    }
}

impl ApiClient {
    /// Authenticate with email and password, then start the session.
    pub async fn login_with_password(&self, email: &str, password: &str, remember: bool) -> Result<UserProfile> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::Validation("Email and password are required".to_string()));
        }

        let request = ApiRequest::post(LOGIN_PATH)
            .json(&LoginBody {
                email,
                password,
                remember,
            })?
            .anonymous();
        let response: LoginResponse = self.send(request).await?;

        self.session().login(
            response.user.clone(),
            AuthTokens {
                access_token: response.access_token,
                refresh_token: response.refresh_token,
            },
            remember,
        );
        Ok(response.user)
    }

    /// Create an account. The backend's response is returned untouched.
    pub async fn register(&self, form: &RegisterForm) -> Result<Value> {
        form.validate()?;

        let request = ApiRequest::post(REGISTER_PATH)
            .json(&RegisterBody {
                username: form.username.trim(),
                email: form.email.trim(),
                password: &form.password,
            })?
            .anonymous();
        let response = self.send(request).await?;

        info!(username = %form.username.trim(), "Registered account");
        Ok(response)
    }

    pub fn oauth_authorize_url(&self, provider: OAuthProvider) -> String {
        provider.authorize_url(self.base_url())
    }

    pub async fn logout(&self) {
        self.session().logout().await;
    }
}
