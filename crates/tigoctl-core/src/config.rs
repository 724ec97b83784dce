//! Application configuration management.
//!
//! Holds the identity provider endpoints, the device profile sent with login
//! requests, the account API settings and the poller tuning.
//!
//! Configuration is stored at `~/.config/tigoctl/config.json`; individual
//! values can be overridden through `TIGOCTL_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "tigoctl";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Seconds between pending-operation polls.
/// Operations expire server-side, so the interval stays short.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Consecutive failed polls before automatic mode gives up.
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub api: ApiConfig,
    pub poller: PollerConfig,
    pub request_timeout_secs: u64,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
    pub last_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Proxy in front of the user pool, used for InitiateAuth/RespondToAuthChallenge
    pub endpoint: String,
    /// Regional endpoint used for user and device management calls
    pub management_endpoint: String,
    pub client_id: String,
    pub user_pool_id: String,
    /// Prepended to usernames that lack it
    pub username_prefix: String,
    /// Prepended to the password before it is sent; the default backend requires it
    pub password_prefix: String,
    pub device: DeviceProfile,
}

/// Fingerprint sent as `UserContextData` with login requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub device_id: String,
    pub device_name: String,
    pub client_timezone: String,
    pub application_name: String,
    pub application_version: String,
    pub language: String,
    pub os_release: String,
    pub screen_height: u32,
    pub screen_width: u32,
    pub signature: Option<String>,
    pub version: String,
    pub user_agent: String,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationToken {
    Id,
    Access,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Which session token goes into the `authorization` header
    pub authorization_token: AuthorizationToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub max_consecutive_errors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            api: ApiConfig::default(),
            poller: PollerConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            data_dir: None,
            last_username: None,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://proxy.cognito.tigomoney.io/".to_string(),
            management_endpoint: "https://cognito-idp.us-east-1.amazonaws.com/".to_string(),
            client_id: "7b5aujqnnu2pf9ji7jdhan12d1".to_string(),
            user_pool_id: "us-east-1_G5gLRkNXN".to_string(),
            username_prefix: "+595".to_string(),
            password_prefix: "COG".to_string(),
            device: DeviceProfile::default(),
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_id: "49b1eaa9-ecc1-4441-93ff-0d7ba6c31246".to_string(),
            device_name: "Windows".to_string(),
            client_timezone: "-03:00".to_string(),
            application_name: "wallet_app_frontend".to_string(),
            application_version: "8.0.16(80160002)".to_string(),
            language: "es-ES".to_string(),
            os_release: "Chrome/139.0.0.0".to_string(),
            screen_height: 1440,
            screen_width: 2560,
            signature: None,
            version: "FLUTTER20230306".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36"
                .to_string(),
            origin: Some("https://moneyapp.tigo.com.py".to_string()),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://py.tigomoney.io".to_string(),
            api_key: None,
            authorization_token: AuthorizationToken::Id,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load the config file (defaults if missing) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `TIGOCTL_*` overrides from the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("TIGOCTL_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(url) = lookup("TIGOCTL_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = lookup("TIGOCTL_IDENTITY_URL") {
            self.identity.endpoint = url;
        }
        if let Some(url) = lookup("TIGOCTL_MANAGEMENT_URL") {
            self.identity.management_endpoint = url;
        }
        if let Some(id) = lookup("TIGOCTL_CLIENT_ID") {
            self.identity.client_id = id;
        }
        if let Some(prefix) = lookup("TIGOCTL_PASSWORD_PREFIX") {
            self.identity.password_prefix = prefix;
        }
        if let Some(dir) = lookup("TIGOCTL_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup("TIGOCTL_POLL_INTERVAL_SECS") {
            self.poller.interval_secs = secs
                .parse()
                .with_context(|| format!("Invalid TIGOCTL_POLL_INTERVAL_SECS: {}", secs))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
