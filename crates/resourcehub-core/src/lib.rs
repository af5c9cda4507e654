//! Client library for the resourcehub backend.
//!
//! - `auth`: credential storage, session state and OAuth redirects
//! - `api`: the refresh-aware HTTP client and typed endpoint wrappers
//! - `models`: users and resources
//! - `config`: backend origin and storage settings
//!
//! A typical setup builds a `CredentialStore`, wraps it in a
//! `SessionManager`, calls `initialize()` once, and hands the session to an
//! `ApiClient`.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiRequest, RegisterForm};
pub use auth::{
    CredentialStore, Credentials, OAuthCallback, OAuthProvider, SessionManager, SessionState,
    StorageKind,
};
pub use config::Config;
pub use models::{AuthTokens, NewResource, Resource, ResourceQuery, SortBy, UserProfile};
