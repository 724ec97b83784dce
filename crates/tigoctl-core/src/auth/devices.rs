//! Tracked-device management for the current user.
//!
//! The current device is whichever key the access token carries. Confirming
//! and remembering it lets the pool skip the SMS step on later logins.

use chrono::Utc;
use rand::Rng;
use tracing::info;

use crate::api::IdentityClient;
use crate::models::{ConfirmDeviceResponse, Device, DeviceRememberedStatus};

use super::credentials::{CredentialStore, DeviceInfo};
use super::session::{Session, SessionError};

/// Prefix for generated device names
const DEVICE_NAME_PREFIX: &str = "tigoctl";

pub struct DeviceManager {
    client: IdentityClient,
}

/// Access token and current device key, cloned out of the session.
fn current_device<S: CredentialStore>(session: &Session<S>) -> Result<(String, String), SessionError> {
    let record = session.require()?;
    let key = record.device_key().ok_or(SessionError::NoDeviceKey)?;
    Ok((record.access_token.clone(), key))
}

fn generated_device_name() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}", DEVICE_NAME_PREFIX, suffix)
}

impl DeviceManager {
    pub fn new(client: IdentityClient) -> Self {
        Self { client }
    }

    /// Fetch the current device and record its status locally.
    pub async fn current<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
    ) -> Result<Device, SessionError> {
        let (access_token, key) = current_device(session)?;
        let device = self.client.get_device(&access_token, &key).await?;

        let status = device.status().map(str::to_string);
        let name = device.name().map(str::to_string);
        session.update(|record| {
            let info = record.device_info.get_or_insert_with(DeviceInfo::default);
            info.status = status;
            if name.is_some() {
                info.device_name = name;
            }
            info.updated_at = Some(Utc::now());
        })?;

        Ok(device)
    }

    pub async fn list<S: CredentialStore>(&self, session: &Session<S>) -> Result<Vec<Device>, SessionError> {
        let record = session.require()?;
        Ok(self.client.list_devices(&record.access_token).await?)
    }

    /// Confirm the current device under `name`, or a generated one.
    pub async fn confirm<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
        name: Option<&str>,
    ) -> Result<ConfirmDeviceResponse, SessionError> {
        let (access_token, key) = current_device(session)?;
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generated_device_name);

        let response = self.client.confirm_device(&access_token, &key, &name).await?;
        info!(device_name = %name, "Device confirmed");

        session.update(|record| {
            let info = record.device_info.get_or_insert_with(DeviceInfo::default);
            info.confirmed = Some(true);
            info.device_name = Some(name);
            info.updated_at = Some(Utc::now());
        })?;

        Ok(response)
    }

    pub async fn set_remembered<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
        remembered: bool,
    ) -> Result<(), SessionError> {
        let (access_token, key) = current_device(session)?;
        let status = if remembered {
            DeviceRememberedStatus::Remembered
        } else {
            DeviceRememberedStatus::NotRemembered
        };
        self.client
            .update_device_status(&access_token, &key, status)
            .await?;
        info!(remembered, "Device remembered status updated");

        session.update(|record| {
            let info = record.device_info.get_or_insert_with(DeviceInfo::default);
            info.remembered = Some(remembered);
            info.updated_at = Some(Utc::now());
        })
    }

    /// Forget a device; the current one when `device_key` is `None`.
    /// Forgetting the current device wipes the local device info.
    pub async fn forget<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
        device_key: Option<&str>,
    ) -> Result<(), SessionError> {
        let record = session.require()?;
        let access_token = record.access_token.clone();
        let current_key = record.device_key();

        let target = match device_key {
            Some(key) => key.to_string(),
            None => current_key.clone().ok_or(SessionError::NoDeviceKey)?,
        };

        self.client.forget_device(&access_token, &target).await?;
        info!(device_key = %target, "Device forgotten");

        if current_key.as_deref() == Some(target.as_str()) {
            session.update(|record| record.device_info = None)?;
        }
        Ok(())
    }
}
