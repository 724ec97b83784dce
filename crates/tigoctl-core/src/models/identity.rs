//! Request and response shapes for the identity provider's JSON protocol.
//!
//! Field names on the wire are PascalCase; a few legacy acronyms
//! (`MFAOptions`, `UserMFASettingList`) are renamed explicitly.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Challenge name the login flow expects after the password step.
pub const SMS_MFA_CHALLENGE: &str = "SMS_MFA";

/// Response to `InitiateAuth` and `RespondToAuthChallenge`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateAuthResponse {
    #[serde(default)]
    pub challenge_name: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub challenge_parameters: HashMap<String, String>,
    #[serde(default)]
    pub authentication_result: Option<AuthenticationResult>,
}

/// Token bundle issued by a successful login or refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub new_device_metadata: Option<NewDeviceMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewDeviceMetadata {
    #[serde(default)]
    pub device_key: Option<String>,
    #[serde(default)]
    pub device_group_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAttribute {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl UserAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MfaOption {
    #[serde(default)]
    pub delivery_medium: Option<String>,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_attributes: Vec<UserAttribute>,
    #[serde(rename = "MFAOptions", default)]
    pub mfa_options: Vec<MfaOption>,
    #[serde(rename = "UserMFASettingList", default)]
    pub mfa_setting_list: Vec<String>,
    #[serde(default)]
    pub preferred_mfa_setting: Option<String>,
}

impl UserProfile {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.user_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn is_verified(&self, name: &str) -> bool {
        self.attribute(&format!("{}_verified", name)) == Some("true")
    }
}

/// One MFA factor's settings in `SetUserMFAPreference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MfaSettings {
    pub enabled: bool,
    pub preferred_mfa: bool,
}

impl MfaSettings {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            preferred_mfa: enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeDeliveryDetails {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub delivery_medium: Option<String>,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateAttributesResponse {
    #[serde(default)]
    pub code_delivery_details_list: Vec<CodeDeliveryDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerificationCodeResponse {
    #[serde(default)]
    pub code_delivery_details: Option<CodeDeliveryDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SoftwareTokenAssociation {
    pub secret_code: String,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SoftwareTokenVerification {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

impl SoftwareTokenVerification {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("SUCCESS")
    }
}

/// A device registered against the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub device_key: String,
    #[serde(default)]
    pub device_attributes: Vec<UserAttribute>,
    /// Epoch seconds
    #[serde(default)]
    pub device_create_date: Option<f64>,
    #[serde(default)]
    pub device_last_modified_date: Option<f64>,
    #[serde(default)]
    pub device_last_authenticated_date: Option<f64>,
}

impl Device {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.device_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// `valid`, `invalid`, ... as reported in the `device_status` attribute
    pub fn status(&self) -> Option<&str> {
        self.attribute("device_status")
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute("device_name")
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.device_create_date.and_then(epoch_to_datetime)
    }

    pub fn last_authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.device_last_authenticated_date.and_then(epoch_to_datetime)
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDeviceResponse {
    pub device: Device,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListDevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub pagination_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfirmDeviceResponse {
    #[serde(default)]
    pub user_confirmation_necessary: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRememberedStatus {
    Remembered,
    NotRemembered,
}

/// Responses with no meaningful payload (`{}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge_response() {
        let json = r#"{
            "ChallengeName": "SMS_MFA",
            "Session": "opaque-session",
            "ChallengeParameters": {"CODE_DELIVERY_DESTINATION": "+*******1234", "CODE_DELIVERY_DELIVERY_MEDIUM": "SMS"}
        }"#;
        let resp: InitiateAuthResponse = serde_json::from_str(json).expect("challenge should parse");
        assert_eq!(resp.challenge_name.as_deref(), Some(SMS_MFA_CHALLENGE));
        assert_eq!(resp.session.as_deref(), Some("opaque-session"));
        assert_eq!(
            resp.challenge_parameters.get("CODE_DELIVERY_DESTINATION").map(String::as_str),
            Some("+*******1234")
        );
        assert!(resp.authentication_result.is_none());
    }

    #[test]
    fn test_parse_authentication_result_without_refresh_token() {
        let json = r#"{"AuthenticationResult": {"AccessToken": "A1", "IdToken": "I1", "ExpiresIn": 3600, "TokenType": "Bearer"}}"#;
        let resp: InitiateAuthResponse = serde_json::from_str(json).expect("result should parse");
        let result = resp.authentication_result.expect("authentication result");
        assert_eq!(result.access_token, "A1");
        assert_eq!(result.refresh_token, None);
        assert_eq!(result.expires_in, Some(3600));
    }

    #[test]
    fn test_parse_user_profile() {
        let json = r#"{
            "Username": "abc-123",
            "UserAttributes": [
                {"Name": "phone_number", "Value": "+595981123456"},
                {"Name": "phone_number_verified", "Value": "true"},
                {"Name": "email", "Value": "a@b.c"}
            ],
            "UserMFASettingList": ["SMS_MFA"],
            "PreferredMfaSetting": "SMS_MFA"
        }"#;
        let user: UserProfile = serde_json::from_str(json).expect("user should parse");
        assert_eq!(user.attribute("phone_number"), Some("+595981123456"));
        assert!(user.is_verified("phone_number"));
        assert!(!user.is_verified("email"));
        assert_eq!(user.mfa_setting_list, vec!["SMS_MFA".to_string()]);
    }

    #[test]
    fn test_parse_device() {
        let json = r#"{"Device": {
            "DeviceKey": "us-east-1_abc",
            "DeviceAttributes": [{"Name": "device_status", "Value": "valid"}, {"Name": "device_name", "Value": "Laptop"}],
            "DeviceCreateDate": 1714557600.5
        }}"#;
        let resp: GetDeviceResponse = serde_json::from_str(json).expect("device should parse");
        assert_eq!(resp.device.status(), Some("valid"));
        assert_eq!(resp.device.name(), Some("Laptop"));
        assert_eq!(
            resp.device.created_at().map(|d| d.timestamp()),
            Some(1_714_557_600)
        );
    }

    #[test]
    fn test_remembered_status_wire_value() {
        assert_eq!(
            serde_json::to_value(DeviceRememberedStatus::NotRemembered).expect("serialize"),
            "not_remembered"
        );
    }
}
