//! HTTP clients for the identity provider and the account operations API.
//!
//! - `IdentityClient` speaks the Cognito JSON protocol (`X-Amz-Target`
//!   header, `application/x-amz-json-1.1` bodies) to the login proxy and the
//!   regional management endpoint.
//! - `ApiClient` calls the account operations REST API with the session's
//!   token and the configured API key.

pub mod client;
pub mod error;
pub mod identity;

pub use client::ApiClient;
pub use error::ApiError;
pub use identity::IdentityClient;
