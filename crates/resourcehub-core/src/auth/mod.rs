//! Authentication module for managing sessions and stored credentials.
//!
//! This module provides:
//! - `StorageArea`: key-value areas (memory, file, OS keychain)
//! - `CredentialStore`: tokens and user profile kept in exactly one area
//! - `SessionManager`: login/logout/refresh and the observable session state
//! - `OAuthProvider`, `OAuthCallback`: OAuth redirect handling
//!
//! Refresh is reactive only: the API client asks for a new access token
//! when a request comes back 401.

pub mod credentials;
pub mod oauth;
pub mod session;
pub mod storage;

pub use credentials::{CredentialStore, Credentials, StorageKind, StoredCredentials};
pub use oauth::{OAuthCallback, OAuthProvider};
pub use session::{SessionManager, SessionState};
pub use storage::{FileArea, KeyringArea, MemoryArea, StorageArea, StorageError};
