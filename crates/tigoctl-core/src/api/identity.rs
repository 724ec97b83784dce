//! Client for the identity provider's JSON protocol.
//!
//! Every call is a POST of an `application/x-amz-json-1.1` body with the
//! operation named in the `X-Amz-Target` header. Login and refresh go to the
//! configured proxy; user and device management go to the regional endpoint
//! and carry the access token in the body.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::{Config, DeviceProfile};
use crate::models::identity::{
    ConfirmDeviceResponse, Device, DeviceRememberedStatus, Empty, GetDeviceResponse,
    InitiateAuthResponse, ListDevicesResponse, MfaSettings, SoftwareTokenAssociation,
    SoftwareTokenVerification, UpdateAttributesResponse, UserAttribute, UserProfile,
    VerificationCodeResponse, SMS_MFA_CHALLENGE,
};

use super::ApiError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Prefix of every `X-Amz-Target` value
const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

/// Maximum devices returned by one `ListDevices` call
const LIST_DEVICES_LIMIT: u32 = 60;

/// Client for the identity provider.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    endpoint: String,
    management_endpoint: String,
    client_id: String,
    user_pool_id: String,
    device: DeviceProfile,
}

impl IdentityClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.identity.device.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Build on top of an existing connection pool.
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: config.identity.endpoint.clone(),
            management_endpoint: config.identity.management_endpoint.clone(),
            client_id: config.identity.client_id.clone(),
            user_pool_id: config.identity.user_pool_id.clone(),
            device: config.identity.device.clone(),
        }
    }

    async fn call<B, T>(&self, url: &str, operation: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(operation, "Identity request");

        let mut request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, CONTENT_TYPE)
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .header(header::CACHE_CONTROL, "no-store");
        if let Some(ref origin) = self.device.origin {
            request = request
                .header(header::ORIGIN, origin.as_str())
                .header(header::REFERER, format!("{}/", origin.trim_end_matches('/')));
        }

        // reqwest's .json() would overwrite the amz content type
        let payload = serde_json::to_vec(body)
            .map_err(|e| ApiError::UnexpectedResponse(format!("failed to encode {operation} request: {e}")))?;
        let response = request.body(payload).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            debug!(operation, %status, "Identity request failed");
            return Err(ApiError::from_identity_response(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            ApiError::unexpected(&format!("failed to parse {operation} response ({e})"), &text)
        })
    }

    /// Base64 `UserContextData.EncodedData` describing this client.
    pub fn encode_context_data(&self, username: &str) -> String {
        let now = Utc::now();
        let payload = json!({
            "contextData": {
                "DeviceId": format!("{}:{}", self.device.device_id, now.to_rfc3339()),
                "DeviceName": self.device.device_name,
                "ClientTimezone": self.device.client_timezone,
                "ApplicationName": self.device.application_name,
                "ApplicationVersion": self.device.application_version,
                "DeviceLanguage": self.device.language,
                "DeviceOSReleaseVersion": self.device.os_release,
                "ScreenHeightPixels": self.device.screen_height.to_string(),
                "ScreenWidthPixels": self.device.screen_width.to_string(),
            },
            "username": username,
            "userPoolId": self.user_pool_id,
            "timestamp": now.timestamp_millis().to_string(),
        });

        let envelope = json!({
            "payload": payload.to_string(),
            "signature": self.device.signature.clone().unwrap_or_default(),
            "version": self.device.version,
        });

        STANDARD.encode(envelope.to_string())
    }

    // ===== Authentication =====

    /// Password step of the login flow.
    pub async fn initiate_password_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<InitiateAuthResponse, ApiError> {
        let body = json!({
            "AuthFlow": "USER_PASSWORD_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": {
                "USERNAME": username,
                "PASSWORD": password,
            },
            "ClientMetadata": {},
            "UserContextData": {
                "EncodedData": self.encode_context_data(username),
            },
        });
        self.call(&self.endpoint, "InitiateAuth", &body).await
    }

    /// SMS step of the login flow.
    pub async fn respond_to_sms_challenge(
        &self,
        username: &str,
        session: &str,
        code: &str,
    ) -> Result<InitiateAuthResponse, ApiError> {
        let body = json!({
            "ClientId": self.client_id,
            "ChallengeName": SMS_MFA_CHALLENGE,
            "Session": session,
            "ChallengeResponses": {
                "USERNAME": username,
                "SMS_MFA_CODE": code,
            },
            "UserContextData": {
                "EncodedData": self.encode_context_data(username),
            },
            "ClientMetadata": {},
        });
        self.call(&self.endpoint, "RespondToAuthChallenge", &body).await
    }

    /// Exchange a refresh token for fresh access and id tokens.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device_key: Option<&str>,
    ) -> Result<InitiateAuthResponse, ApiError> {
        let mut params = serde_json::Map::new();
        params.insert("REFRESH_TOKEN".to_string(), json!(refresh_token));
        if let Some(key) = device_key {
            params.insert("DEVICE_KEY".to_string(), json!(key));
        }

        let body = json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": params,
        });
        self.call(&self.endpoint, "InitiateAuth", &body).await
    }

    // ===== User management =====

    pub async fn get_user(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        let body = json!({ "AccessToken": access_token });
        self.call(&self.management_endpoint, "GetUser", &body).await
    }

    pub async fn update_user_attributes(
        &self,
        access_token: &str,
        attributes: &[UserAttribute],
    ) -> Result<UpdateAttributesResponse, ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "UserAttributes": attributes,
        });
        self.call(&self.management_endpoint, "UpdateUserAttributes", &body)
            .await
    }

    pub async fn delete_user_attributes(
        &self,
        access_token: &str,
        names: &[&str],
    ) -> Result<(), ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "UserAttributeNames": names,
        });
        let _: Empty = self
            .call(&self.management_endpoint, "DeleteUserAttributes", &body)
            .await?;
        Ok(())
    }

    /// Ask the provider to send a verification code for an attribute
    /// (`email`, `phone_number`).
    pub async fn request_attribute_verification(
        &self,
        access_token: &str,
        attribute: &str,
    ) -> Result<VerificationCodeResponse, ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "AttributeName": attribute,
        });
        self.call(&self.management_endpoint, "GetUserAttributeVerificationCode", &body)
            .await
    }

    pub async fn verify_user_attribute(
        &self,
        access_token: &str,
        attribute: &str,
        code: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "AttributeName": attribute,
            "Code": code,
        });
        let _: Empty = self
            .call(&self.management_endpoint, "VerifyUserAttribute", &body)
            .await?;
        Ok(())
    }

    /// Set SMS and/or software-token MFA. `None` leaves that factor untouched.
    pub async fn set_mfa_preference(
        &self,
        access_token: &str,
        sms: Option<MfaSettings>,
        software_token: Option<MfaSettings>,
    ) -> Result<(), ApiError> {
        let mut body = serde_json::Map::new();
        body.insert("AccessToken".to_string(), json!(access_token));
        if let Some(sms) = sms {
            body.insert("SMSMfaSettings".to_string(), json!(sms));
        }
        if let Some(totp) = software_token {
            body.insert("SoftwareTokenMfaSettings".to_string(), json!(totp));
        }
        let _: Empty = self
            .call(&self.management_endpoint, "SetUserMFAPreference", &body)
            .await?;
        Ok(())
    }

    /// Start TOTP enrolment. Fails with `SoftwareTokenMFANotFoundException`
    /// when the pool does not allow it.
    pub async fn associate_software_token(
        &self,
        access_token: &str,
    ) -> Result<SoftwareTokenAssociation, ApiError> {
        let body = json!({ "AccessToken": access_token });
        self.call(&self.management_endpoint, "AssociateSoftwareToken", &body)
            .await
    }

    pub async fn verify_software_token(
        &self,
        access_token: &str,
        code: &str,
        friendly_name: &str,
    ) -> Result<SoftwareTokenVerification, ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "UserCode": code,
            "FriendlyDeviceName": friendly_name,
        });
        self.call(&self.management_endpoint, "VerifySoftwareToken", &body)
            .await
    }

    pub async fn change_password(
        &self,
        access_token: &str,
        previous: &str,
        proposed: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "PreviousPassword": previous,
            "ProposedPassword": proposed,
        });
        let _: Empty = self
            .call(&self.management_endpoint, "ChangePassword", &body)
            .await?;
        Ok(())
    }

    // ===== Device management =====

    pub async fn get_device(&self, access_token: &str, device_key: &str) -> Result<Device, ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "DeviceKey": device_key,
        });
        let response: GetDeviceResponse = self
            .call(&self.management_endpoint, "GetDevice", &body)
            .await?;
        Ok(response.device)
    }

    /// All devices registered to the user, following pagination.
    pub async fn list_devices(&self, access_token: &str) -> Result<Vec<Device>, ApiError> {
        let mut devices = Vec::new();
        let mut pagination_token: Option<String> = None;

        loop {
            let mut body = json!({
                "AccessToken": access_token,
                "Limit": LIST_DEVICES_LIMIT,
            });
            if let Some(ref token) = pagination_token {
                body["PaginationToken"] = json!(token);
            }

            let page: ListDevicesResponse = self
                .call(&self.management_endpoint, "ListDevices", &body)
                .await?;
            devices.extend(page.devices);

            match page.pagination_token {
                Some(token) if !token.is_empty() => pagination_token = Some(token),
                _ => break,
            }
        }

        Ok(devices)
    }

    pub async fn confirm_device(
        &self,
        access_token: &str,
        device_key: &str,
        device_name: &str,
    ) -> Result<ConfirmDeviceResponse, ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "DeviceKey": device_key,
            "DeviceName": device_name,
        });
        self.call(&self.management_endpoint, "ConfirmDevice", &body)
            .await
    }

    pub async fn update_device_status(
        &self,
        access_token: &str,
        device_key: &str,
        status: DeviceRememberedStatus,
    ) -> Result<(), ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "DeviceKey": device_key,
            "DeviceRememberedStatus": status,
        });
        let _: Empty = self
            .call(&self.management_endpoint, "UpdateDeviceStatus", &body)
            .await?;
        Ok(())
    }

    pub async fn forget_device(&self, access_token: &str, device_key: &str) -> Result<(), ApiError> {
        let body = json!({
            "AccessToken": access_token,
            "DeviceKey": device_key,
        });
        let _: Empty = self
            .call(&self.management_endpoint, "ForgetDevice", &body)
            .await?;
        Ok(())
    }
}
