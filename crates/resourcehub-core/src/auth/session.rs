//! Session state and the login, logout and token-refresh transitions.
//!
//! The `SessionManager` is the only writer of session state; observers
//! subscribe to a `watch` channel and see every transition.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::credentials::{CredentialStore, Credentials, StorageKind};
use super::oauth::OAuthCallback;
use crate::api::request::endpoint;
use crate::api::{ApiError, Result};
use crate::models::{AuthTokens, UserProfile};

const LOGOUT_PATH: &str = "/auth/logout";
const TOKEN_PATH: &str = "/auth/token";

/// Authentication state as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Startup check has not run yet
    Unknown,
    Authenticated(UserProfile),
    Anonymous,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Unknown)
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

/// Owns the session state and the login/logout/refresh transitions.
///
/// Share it behind an `Arc`; the `ApiClient` holds one to refresh tokens.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    http: Client,
    base_url: String,
    state: watch::Sender<SessionState>,
    /// Serializes refreshes so concurrent 401s share one backend call
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: Arc<CredentialStore>, http: Client, base_url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            store,
            http,
            base_url: base_url.into(),
            state,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user().cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Derive the session from stored credentials. Run once at startup.
    pub fn initialize(&self) -> SessionState {
        let state = match self.store.read() {
            Some(stored) => {
                debug!(kind = ?stored.kind, "Restored session from stored credentials");
                SessionState::Authenticated(stored.credentials.user)
            }
            None => {
                debug!("No stored credentials found");
                SessionState::Anonymous
            }
        };
        self.set_state(state.clone());
        state
    }

    /// Record a login the backend has already accepted.
    ///
    /// Never fails: if the durable area cannot be written, the credentials are
    /// kept in the ephemeral area for this session instead.
    pub fn login(&self, user: UserProfile, tokens: AuthTokens, remember: bool) {
        let credentials = Credentials {
            access_token: tokens.access_token,
            refresh_token: Some(tokens.refresh_token).filter(|t| !t.is_empty()),
            user: user.clone(),
        };
        let kind = StorageKind::from_remember(remember);

        if let Err(e) = self.store.write(&credentials, kind) {
            warn!(error = %e, ?kind, "Failed to persist credentials");
            if kind == StorageKind::Durable {
                if let Err(e) = self.store.write(&credentials, StorageKind::Ephemeral) {
                    error!(error = %e, "Failed to keep credentials for this session");
                }
            }
        }

        info!(user = %user.display_name(), ?kind, "Logged in");
        self.set_state(SessionState::Authenticated(user));
    }

    /// Complete an OAuth redirect and log in with the tokens it carries.
    pub fn login_with_oauth_callback(&self, callback_url: &str, remember: bool) -> Result<UserProfile> {
        let callback = OAuthCallback::parse(callback_url)?;
        let user = callback.user.clone();
        self.login(callback.user, callback.tokens, remember);
        Ok(user)
    }

    /// Log out locally, telling the backend on a best-effort basis.
    ///
    /// The backend is sent the stored refresh token so it can revoke it. Any
    /// failure there is logged and ignored; local state is always cleared.
    pub async fn logout(&self) {
        match self.store.refresh_token() {
            Some(refresh_token) => {
                let url = endpoint(&self.base_url, LOGOUT_PATH);
                let result = self
                    .http
                    .post(&url)
                    .json(&RefreshTokenBody {
                        refresh_token: &refresh_token,
                    })
                    .send()
                    .await;
                match result {
                    Ok(response) if response.status().is_success() => {
                        debug!("Backend logout acknowledged");
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), "Backend logout rejected");
                    }
                    Err(e) => {
                        warn!(error = %e, "Backend logout request failed");
                    }
                }
            }
            None => debug!("No refresh token stored, skipping backend logout"),
        }

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        if self.state.borrow().is_authenticated() {
            info!("Logged out");
        }
        self.set_state(SessionState::Anonymous);
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `None` when there is no refresh token or the exchange fails;
    /// a failed exchange logs the session out.
    pub async fn refresh(&self) -> Option<String> {
        self.refresh_after(None).await
    }

    /// Refresh on behalf of a request that was rejected while using `stale`.
    /// If another caller already replaced `stale`, its token is reused.
    pub(crate) async fn refresh_after(&self, stale: Option<&str>) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;

        if let (Some(stale), Some(current)) = (stale, self.store.access_token()) {
            if current != stale {
                debug!("Access token already refreshed by a concurrent request");
                return Some(current);
            }
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("No refresh token available");
            self.set_state(SessionState::Anonymous);
            return None;
        };

        match self.request_access_token(&refresh_token).await {
            Ok(token) => {
                match self.store.update_access_token(&token) {
                    Ok(true) => info!("Access token refreshed"),
                    Ok(false) => warn!("Refresh token disappeared before the access token was saved"),
                    Err(e) => warn!(error = %e, "Failed to save refreshed access token"),
                }
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, logging out");
                self.logout().await;
                None
            }
        }
    }

    async fn request_access_token(&self, refresh_token: &str) -> Result<String> {
        let url = endpoint(&self.base_url, TOKEN_PATH);
        let response = self
            .http
            .post(&url)
            .json(&RefreshTokenBody { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("token response: {}", e)))?;
        if body.access_token.is_empty() {
            return Err(ApiError::Parse("token response has an empty access token".to_string()));
        }
        Ok(body.access_token)
    }
}
