//! Data models for the identity provider and the account operations API.
//!
//! - `AccountNumber`, `AccountInfo`: account lookup
//! - `PendingOperation`, `AcceptResult`: operations awaiting approval
//! - Identity types: token bundles, challenges, user profile, devices

pub mod account;
pub mod identity;
pub mod operation;

pub use account::{AccountInfo, AccountName, AccountNumber, InvalidAccountNumber};
pub use identity::{
    AuthenticationResult, CodeDeliveryDetails, ConfirmDeviceResponse, Device,
    DeviceRememberedStatus, InitiateAuthResponse, MfaSettings, NewDeviceMetadata,
    SoftwareTokenAssociation, SoftwareTokenVerification, UserAttribute, UserProfile,
    SMS_MFA_CHALLENGE,
};
pub use operation::{AcceptResult, Amount, MetadataEntry, PendingOperation, StatusPatch};
