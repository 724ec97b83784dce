//! Refresh-token exchange.

use chrono::Utc;
use tracing::{debug, info};

use crate::api::{ApiError, IdentityClient};

use super::credentials::CredentialStore;
use super::session::{Session, SessionError};

/// What a refresh changed, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub expires_in: u64,
    pub refresh_token_rotated: bool,
    pub used_device_key: bool,
}

pub struct TokenRefresher {
    client: IdentityClient,
}

impl TokenRefresher {
    pub fn new(client: IdentityClient) -> Self {
        Self { client }
    }

    /// One refresh attempt. On any failure the stored record is untouched.
    pub async fn refresh<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
    ) -> Result<RefreshOutcome, SessionError> {
        let record = session.require()?;
        if !record.has_refresh_token() {
            return Err(SessionError::MissingRefreshToken);
        }

        // Pools that track devices reject refreshes without the key
        let device_key = record.device_key();
        debug!(has_device_key = device_key.is_some(), "Refreshing tokens");

        let response = self
            .client
            .refresh(&record.refresh_token, device_key.as_deref())
            .await?;

        let result = response.authentication_result.ok_or_else(|| {
            ApiError::UnexpectedResponse(format!(
                "no AuthenticationResult in refresh response (challenge {:?})",
                response.challenge_name
            ))
        })?;

        let refresh_token_rotated = result
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        let now = Utc::now();
        session.update(|record| record.apply_refresh(result, now))?;

        let expires_in = session.require()?.expires_in;
        info!(expires_in, refresh_token_rotated, "Tokens refreshed");

        Ok(RefreshOutcome {
            expires_in,
            refresh_token_rotated,
            used_device_key: device_key.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{sample_record, CredentialRecord, MemoryStore};
    use crate::auth::token::encode_test_token;
    use crate::config::Config;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresher_for(server: &MockServer) -> TokenRefresher {
        let mut config = Config::default();
        config.identity.endpoint = server.uri();
        TokenRefresher::new(IdentityClient::new(&config).expect("client should build"))
    }

    fn starting_record() -> CredentialRecord {
        CredentialRecord {
            access_token: "A0".to_string(),
            refresh_token: "R1".to_string(),
            id_token: String::new(),
            expires_in: 0,
            ..sample_record()
        }
    }

    #[tokio::test]
    async fn test_refresh_without_new_refresh_token_keeps_old_one() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "AuthFlow": "REFRESH_TOKEN_AUTH",
                "AuthParameters": {"REFRESH_TOKEN": "R1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AuthenticationResult": {"AccessToken": "A1substring", "IdToken": "I1", "ExpiresIn": 1800}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::with_record(starting_record());
        let mut session = Session::open(&store).expect("open");
        let outcome = refresher_for(&server)
            .refresh(&mut session)
            .await
            .expect("refresh should succeed");

        assert_eq!(
            outcome,
            RefreshOutcome {
                expires_in: 1800,
                refresh_token_rotated: false,
                used_device_key: false,
            }
        );

        let stored = store.snapshot().expect("record stored");
        assert_eq!(stored.refresh_token, "R1");
        assert_eq!(stored.access_token, "A1substring");
        assert_eq!(stored.id_token, "I1");
        assert_eq!(stored.expires_in, 1800);
    }

    #[tokio::test]
    async fn test_refresh_sends_device_key_and_rotates_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "AuthParameters": {"REFRESH_TOKEN": "R1", "DEVICE_KEY": "us-east-1_dev"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AuthenticationResult": {"AccessToken": "A1", "IdToken": "I1", "RefreshToken": "R2", "ExpiresIn": 3600}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut record = starting_record();
        record.access_token = encode_test_token(&json!({"device_key": "us-east-1_dev"}));
        let store = MemoryStore::with_record(record);
        let mut session = Session::open(&store).expect("open");

        let outcome = refresher_for(&server)
            .refresh(&mut session)
            .await
            .expect("refresh should succeed");

        assert!(outcome.used_device_key);
        assert!(outcome.refresh_token_rotated);
        assert_eq!(store.snapshot().map(|r| r.refresh_token), Some("R2".to_string()));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_leaves_record_unmodified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "NotAuthorizedException",
                "message": "Refresh Token has expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::with_record(starting_record());
        let mut session = Session::open(&store).expect("open");
        let err = refresher_for(&server)
            .refresh(&mut session)
            .await
            .expect_err("refresh should fail");

        assert!(err.requires_login());
        assert_eq!(store.save_count(), 0);
        assert_eq!(session.record(), Some(&starting_record()));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut record = starting_record();
        record.refresh_token = String::new();
        let store = MemoryStore::with_record(record);
        let mut session = Session::open(&store).expect("open");

        let err = refresher_for(&server)
            .refresh(&mut session)
            .await
            .expect_err("no refresh token");
        assert!(matches!(err, SessionError::MissingRefreshToken));
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let server = MockServer::start().await;
        let store = MemoryStore::new();
        let mut session = Session::open(&store).expect("open");
        let err = refresher_for(&server)
            .refresh(&mut session)
            .await
            .expect_err("no record");
        assert!(matches!(err, SessionError::NotLoggedIn));
    }
}
