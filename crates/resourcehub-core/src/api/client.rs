//! API client for communicating with the resourcehub REST backend.
//!
//! Authenticated requests carry the stored bearer token. A 401 triggers one
//! token refresh through the `SessionManager`, after which the captured
//! request is replayed exactly once.

use std::sync::Arc;

use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::error::{ApiError, Result};
use super::request::{endpoint, ApiRequest};
use crate::auth::SessionManager;

/// API client for the resourcehub backend.
/// Clone is cheap - reqwest::Client and the session are both shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl ApiClient {
    /// Create a client that shares the session's connection pool and origin
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            client: session.http().clone(),
            base_url: session.base_url().to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Issue `request`, refreshing the token and replaying it once on 401.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let token = if request.authenticated {
            self.session.access_token()
        } else {
            None
        };

        let response = self.execute(&request, token.as_deref()).await?;
        if !request.authenticated || response.status() != StatusCode::UNAUTHORIZED {
            return Self::parse_response(response).await;
        }

        let body = response.text().await.unwrap_or_default();
        debug!(method = %request.method, path = %request.path, "Unauthorized, refreshing token");

        match self.session.refresh_after(token.as_deref()).await {
            Some(new_token) => {
                // Whatever the replay returns is final
                let retry = self.execute(&request, Some(&new_token)).await?;
                Self::parse_response(retry).await
            }
            None => Err(ApiError::auth_expired(&body)),
        }
    }

    async fn execute(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response> {
        let url = endpoint(&self.base_url, &request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            // Also sets Content-Type: application/json
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, authenticated = token.is_some(), "Sending request");
        Ok(builder.send().await?)
    }

    /// Parse a 2xx body as JSON, or turn anything else into an `ApiError`.
    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, url = %url, body = %ApiError::truncate_body(&body), "Request failed");
            return Err(ApiError::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        // No content reads as JSON null
        let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(bytes)
            .map_err(|e| ApiError::Parse(format!("{} (from {})", e, url)))
    }
}
