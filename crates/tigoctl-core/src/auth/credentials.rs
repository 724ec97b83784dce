//! The persisted credential record and the stores that hold it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthorizationToken;
use crate::models::AuthenticationResult;

use super::token::{decode_claims, TokenClaims};

/// Credentials file name in the data directory
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed credentials file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Device metadata tracked alongside the tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_group_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remembered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The single set of tokens for this installation.
///
/// Legacy files written with PascalCase token names are still readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(alias = "AccessToken")]
    pub access_token: String,
    #[serde(alias = "IdToken", default)]
    pub id_token: String,
    #[serde(alias = "RefreshToken", default)]
    pub refresh_token: String,
    /// Seconds after `issued_at` at which the access and id tokens expire
    #[serde(alias = "ExpiresIn", default)]
    pub expires_in: u64,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
    #[serde(alias = "TokenType", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

impl CredentialRecord {
    /// Build a fresh record from a login result. `None` if the server did
    /// not issue a refresh token.
    pub fn from_login(result: AuthenticationResult, now: DateTime<Utc>) -> Option<Self> {
        let refresh_token = result.refresh_token.filter(|t| !t.is_empty())?;
        let device_info = result.new_device_metadata.map(|meta| DeviceInfo {
            device_group_key: meta.device_group_key,
            confirmed: Some(false),
            updated_at: Some(now),
            ..DeviceInfo::default()
        });

        Some(Self {
            access_token: result.access_token,
            id_token: result.id_token,
            refresh_token,
            expires_in: result.expires_in.unwrap_or_default(),
            issued_at: now,
            token_type: result.token_type,
            device_info,
        })
    }

    /// Merge a refresh result. The refresh token, expiry and token type are
    /// only replaced when the server sent new values.
    pub fn apply_refresh(&mut self, result: AuthenticationResult, now: DateTime<Utc>) {
        self.access_token = result.access_token;
        self.id_token = result.id_token;
        if let Some(refresh_token) = result.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = refresh_token;
        }
        if let Some(expires_in) = result.expires_in {
            self.expires_in = expires_in;
        }
        if result.token_type.is_some() {
            self.token_type = result.token_type;
        }
        self.issued_at = now;
    }

    pub fn access_claims(&self) -> Option<TokenClaims> {
        decode_claims(&self.access_token)
    }

    pub fn id_claims(&self) -> Option<TokenClaims> {
        decode_claims(&self.id_token)
    }

    /// Device key from the access-token payload.
    pub fn device_key(&self) -> Option<String> {
        self.access_claims()
            .and_then(|c| c.device_key)
            .filter(|k| !k.is_empty())
    }

    /// Phone number from the id-token payload.
    pub fn phone_number(&self) -> Option<String> {
        self.id_claims().and_then(|c| c.phone_number)
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Token placed in the `authorization` header of account API calls
    pub fn api_token(&self, kind: AuthorizationToken) -> &str {
        match kind {
            AuthorizationToken::Id => &self.id_token,
            AuthorizationToken::Access => &self.access_token,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in as i64)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Check if the tokens will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        Utc::now() > self.expires_at() - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES)
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at() - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// Where the credential record lives.
pub trait CredentialStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError>;

    /// Overwrite the stored record wholesale.
    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Record stored as a pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `credentials.json` inside the given data directory
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonFileStore {
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(record)?;

        // Write then rename so a crash never leaves a half-written record
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-process store for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<CredentialRecord> {
        self.record.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.record.lock() {
            *slot = Some(record.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut slot) = self.record.lock() {
            *slot = None;
        }
        Ok(())
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for &T {
    fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        (**self).load()
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        (**self).save(record)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> CredentialRecord {
    use chrono::TimeZone;

    CredentialRecord {
        access_token: "A0".to_string(),
        id_token: "I0".to_string(),
        refresh_token: "R1".to_string(),
        expires_in: 3600,
        issued_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp"),
        token_type: Some("Bearer".to_string()),
        device_info: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::encode_test_token;
    use crate::models::NewDeviceMetadata;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn refresh_result(refresh_token: Option<&str>) -> AuthenticationResult {
        AuthenticationResult {
            access_token: "A1substring".to_string(),
            id_token: "I1".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: Some(1800),
            token_type: None,
            new_device_metadata: None,
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = JsonFileStore::in_dir(dir.path());
        assert_eq!(store.load().expect("load empty"), None);

        let mut record = sample_record();
        record.device_info = Some(DeviceInfo {
            device_group_key: Some("g1".to_string()),
            device_name: Some("laptop".to_string()),
            confirmed: Some(true),
            remembered: Some(false),
            status: Some("valid".to_string()),
            updated_at: Some(Utc::now()),
        });

        store.save(&record).expect("save");
        assert_eq!(store.load().expect("load"), Some(record.clone()));

        // Overwritten wholesale
        let mut second = sample_record();
        second.access_token = "A2".to_string();
        store.save(&second).expect("save again");
        assert_eq!(store.load().expect("load again"), Some(second));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load cleared"), None);
    }

    #[test]
    fn test_file_store_reads_legacy_names() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CREDENTIALS_FILE);
        std::fs::write(
            &path,
            r#"{"AccessToken":"A","IdToken":"I","RefreshToken":"R","ExpiresIn":3600,"TokenType":"Bearer"}"#,
        )
        .expect("write legacy file");

        let record = JsonFileStore::new(&path)
            .load()
            .expect("load")
            .expect("record present");
        assert_eq!(record.access_token, "A");
        assert_eq!(record.refresh_token, "R");
        assert_eq!(record.expires_in, 3600);
    }

    #[test]
    fn test_file_store_malformed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CREDENTIALS_FILE);
        std::fs::write(&path, "{not json").expect("write");
        assert!(matches!(JsonFileStore::new(&path).load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_apply_refresh_keeps_refresh_token_when_absent() {
        let mut record = sample_record();
        record.id_token = String::new();
        record.expires_in = 0;

        let now = Utc::now();
        record.apply_refresh(refresh_result(None), now);

        assert_eq!(record.refresh_token, "R1");
        assert_eq!(record.access_token, "A1substring");
        assert_eq!(record.id_token, "I1");
        assert_eq!(record.expires_in, 1800);
        assert_eq!(record.issued_at, now);
        assert_eq!(record.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn test_apply_refresh_replaces_refresh_token_when_present() {
        let mut record = sample_record();
        record.apply_refresh(refresh_result(Some("R2")), Utc::now());
        assert_eq!(record.refresh_token, "R2");
    }

    #[test]
    fn test_from_login() {
        let result = AuthenticationResult {
            access_token: "A".to_string(),
            id_token: "I".to_string(),
            refresh_token: Some("R".to_string()),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
            new_device_metadata: Some(NewDeviceMetadata {
                device_key: Some("k".to_string()),
                device_group_key: Some("g".to_string()),
            }),
        };
        let record = CredentialRecord::from_login(result.clone(), Utc::now()).expect("record");
        assert_eq!(record.refresh_token, "R");
        assert_eq!(
            record.device_info.and_then(|d| d.device_group_key),
            Some("g".to_string())
        );

        let mut without_refresh = result;
        without_refresh.refresh_token = None;
        assert!(CredentialRecord::from_login(without_refresh, Utc::now()).is_none());
    }

    #[test]
    fn test_device_key_is_derived_from_access_token() {
        let mut record = sample_record();
        assert_eq!(record.device_key(), None);

        record.access_token = encode_test_token(&json!({"device_key": "us-east-1_dev"}));
        assert_eq!(record.device_key().as_deref(), Some("us-east-1_dev"));
    }

    #[test]
    fn test_expiry() {
        let mut record = sample_record();
        record.issued_at = Utc::now();
        record.expires_in = 3600;
        assert!(!record.is_expired());
        assert!(!record.needs_refresh());
        assert!(record.minutes_until_expiry() >= 59);

        record.expires_in = 120;
        assert!(!record.is_expired());
        assert!(record.needs_refresh());

        record.issued_at = Utc::now() - Duration::hours(2);
        assert!(record.is_expired());
        assert_eq!(record.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_api_token_selection() {
        let record = sample_record();
        assert_eq!(record.api_token(AuthorizationToken::Id), "I0");
        assert_eq!(record.api_token(AuthorizationToken::Access), "A0");
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::new();
        assert_eq!(store.load().expect("load"), None);
        store.save(&sample_record()).expect("save");
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot(), Some(sample_record()));
    }
}
