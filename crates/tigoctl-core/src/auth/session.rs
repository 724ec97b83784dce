use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ApiError;

use super::credentials::{CredentialRecord, CredentialStore, StoreError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to read credentials: {0}")]
    Store(#[from] StoreError),

    /// The remote call succeeded and the in-memory record is current, but it
    /// could not be written to disk.
    #[error("Failed to save credentials: {0}")]
    Persist(#[source] StoreError),

    #[error("Not logged in - run the login flow first")]
    NotLoggedIn,

    #[error("No refresh token stored - log in again")]
    MissingRefreshToken,

    #[error("No device key in the current access token")]
    NoDeviceKey,
}

impl SessionError {
    /// True when the user has to run the full login flow again.
    pub fn requires_login(&self) -> bool {
        match self {
            SessionError::Api(e) => e.is_authentication(),
            SessionError::NotLoggedIn | SessionError::MissingRefreshToken => true,
            _ => false,
        }
    }
}

/// The current credential record plus the store it came from.
///
/// Components borrow the session mutably for the duration of a call; the
/// store is written on every successful change.
pub struct Session<S: CredentialStore> {
    store: S,
    record: Option<CredentialRecord>,
}

impl<S: CredentialStore> Session<S> {
    /// Empty session over a store, without reading it
    pub fn new(store: S) -> Self {
        Self {
            store,
            record: None,
        }
    }

    /// Load the stored record, if any
    pub fn open(store: S) -> Result<Self, SessionError> {
        let record = store.load()?;
        debug!(present = record.is_some(), "Loaded credential record");
        Ok(Self { store, record })
    }

    pub fn record(&self) -> Option<&CredentialRecord> {
        self.record.as_ref()
    }

    pub fn require(&self) -> Result<&CredentialRecord, SessionError> {
        self.record.as_ref().ok_or(SessionError::NotLoggedIn)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check if session is usable (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.record.as_ref().map(|r| !r.is_expired()).unwrap_or(false)
    }

    /// Replace the record wholesale and persist it.
    pub fn replace(&mut self, record: CredentialRecord) -> Result<(), SessionError> {
        self.record = Some(record);
        self.persist()
    }

    /// Mutate the current record in place and persist it.
    pub fn update<F>(&mut self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut CredentialRecord),
    {
        let record = self.record.as_mut().ok_or(SessionError::NotLoggedIn)?;
        f(record);
        self.persist()
    }

    /// Drop the record and delete it from the store
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.record = None;
        self.store.clear()?;
        Ok(())
    }

    fn persist(&self) -> Result<(), SessionError> {
        if let Some(ref record) = self.record {
            if let Err(e) = self.store.save(record) {
                warn!(error = %e, "Credential record updated in memory but not saved");
                return Err(SessionError::Persist(e));
            }
        }
        Ok(())
    }
}
