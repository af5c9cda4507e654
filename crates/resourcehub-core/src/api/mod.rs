//! REST API client module for the resourcehub backend.
//!
//! This module provides the `ApiClient`, which attaches the stored bearer
//! token to every authenticated request and, when the backend answers 401,
//! refreshes the token once and replays the captured request.

mod auth;
pub mod client;
pub mod error;
pub mod request;
mod resources;

pub use auth::RegisterForm;
pub use client::ApiClient;
pub use error::{ApiError, Result};
pub use request::ApiRequest;
