//! Authentication module for managing the credential lifecycle.
//!
//! This module provides:
//! - `CredentialRecord` and the `CredentialStore` trait (`JsonFileStore`, `MemoryStore`)
//! - `Session`: the loaded record plus its store, passed into every component
//! - `Authenticator`: password + SMS login
//! - `TokenRefresher`: refresh-token exchange that never drops the old refresh token
//! - `DeviceManager`: confirm, remember and forget tracked devices

pub mod authenticator;
pub mod credentials;
pub mod devices;
pub mod refresher;
pub mod session;
pub mod token;

pub use authenticator::{Authenticator, SmsChallenge};
pub use credentials::{
    CredentialRecord, CredentialStore, DeviceInfo, JsonFileStore, MemoryStore, StoreError,
};
pub use devices::DeviceManager;
pub use refresher::{RefreshOutcome, TokenRefresher};
pub use session::{Session, SessionError};
pub use token::{decode_claims, token_tail, TokenClaims};
