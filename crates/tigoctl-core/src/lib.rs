//! Core library for tigoctl.
//!
//! Logs in to the wallet's identity pool (password plus SMS code), keeps the
//! resulting tokens fresh, and approves pending account operations on behalf
//! of the account holder. The CLI crate is a thin layer over these modules;
//! nothing here reads from or writes to the terminal.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod poller;

pub use api::{ApiClient, ApiError, IdentityClient};
pub use auth::{
    Authenticator, CredentialRecord, CredentialStore, DeviceManager, JsonFileStore, Session,
    SessionError, TokenRefresher,
};
pub use cache::{CacheManager, HistoryEntry};
pub use config::Config;
pub use poller::{accept_all, AcceptFailure, OperationPoller, PollEvent, PollOutcome};
