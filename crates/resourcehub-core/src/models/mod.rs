//! Data models for backend entities.
//!
//! - `UserProfile`, `AuthTokens`: authenticated identity and its tokens
//! - `Resource`, `NewResource`: listed/created resources
//! - `ResourceQuery`, `SortBy`: list parameters

pub mod resource;
pub mod user;

pub use resource::{NewResource, Resource, ResourceQuery, SortBy};
pub use user::{AuthTokens, UserProfile};
