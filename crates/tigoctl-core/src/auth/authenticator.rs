//! Two-step password + SMS login.
//!
//! `start` sends the password and returns the SMS challenge; the caller
//! collects the code however it likes and hands it to `complete`, which
//! writes the new credential record. Nothing is stored before `complete`
//! succeeds, and neither step is retried: the challenge session and the SMS
//! code are both single-use.

use chrono::Utc;
use tracing::{info, warn};

use crate::api::{ApiError, IdentityClient};
use crate::config::IdentityConfig;
use crate::models::SMS_MFA_CHALLENGE;

use super::credentials::{CredentialRecord, CredentialStore};
use super::session::{Session, SessionError};

/// Challenge parameter holding the masked phone number
const DELIVERY_DESTINATION_PARAM: &str = "CODE_DELIVERY_DESTINATION";

/// Pending SMS challenge from the password step. Consumed by `complete`.
#[derive(Debug)]
pub struct SmsChallenge {
    username: String,
    session: String,
    destination: Option<String>,
}

impl SmsChallenge {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Masked number the code was sent to, e.g. `+********1234`
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }
}

pub struct Authenticator {
    client: IdentityClient,
    username_prefix: String,
    password_prefix: String,
}

impl Authenticator {
    pub fn new(client: IdentityClient, config: &IdentityConfig) -> Self {
        Self {
            client,
            username_prefix: config.username_prefix.clone(),
            password_prefix: config.password_prefix.clone(),
        }
    }

    /// Prepend the country prefix when the input lacks it.
    pub fn normalize_username(&self, input: &str) -> String {
        let trimmed = input.trim();
        if self.username_prefix.is_empty() || trimmed.starts_with(&self.username_prefix) {
            return trimmed.to_string();
        }
        format!("{}{}", self.username_prefix, trimmed.trim_start_matches('+'))
    }

    /// The backend expects every password with a fixed prefix the user never types.
    fn prefixed_password(&self, password: &str) -> String {
        format!("{}{}", self.password_prefix, password)
    }

    /// Password step. Succeeds only when the server asks for an SMS code.
    pub async fn start(&self, username: &str, password: &str) -> Result<SmsChallenge, SessionError> {
        let username = self.normalize_username(username);
        let password = self.prefixed_password(password);

        info!(username = %username, "Starting password authentication");
        let response = self.client.initiate_password_auth(&username, &password).await?;

        let challenge = response.challenge_name.as_deref();
        let session = response.session.filter(|s| !s.is_empty());
        match (challenge, session) {
            (Some(SMS_MFA_CHALLENGE), Some(session)) => {
                let destination = response
                    .challenge_parameters
                    .get(DELIVERY_DESTINATION_PARAM)
                    .cloned();
                info!("SMS challenge issued");
                Ok(SmsChallenge {
                    username,
                    session,
                    destination,
                })
            }
            (other, _) => {
                warn!(challenge = ?other, "Unexpected InitiateAuth response");
                Err(ApiError::UnexpectedResponse(format!(
                    "expected an {} challenge with a session, got challenge {:?}{}",
                    SMS_MFA_CHALLENGE,
                    other,
                    if response.authentication_result.is_some() {
                        " and tokens"
                    } else {
                        ""
                    }
                ))
                .into())
            }
        }
    }

    /// SMS step. On success the session's record is replaced and persisted.
    pub async fn complete<S: CredentialStore>(
        &self,
        session: &mut Session<S>,
        challenge: SmsChallenge,
        code: &str,
    ) -> Result<(), SessionError> {
        let response = self
            .client
            .respond_to_sms_challenge(&challenge.username, &challenge.session, code.trim())
            .await?;

        let result = response.authentication_result.ok_or_else(|| {
            ApiError::UnexpectedResponse(format!(
                "no AuthenticationResult in challenge response (challenge {:?})",
                response.challenge_name
            ))
        })?;

        let record = CredentialRecord::from_login(result, Utc::now()).ok_or_else(|| {
            ApiError::UnexpectedResponse("login response did not include a refresh token".to_string())
        })?;

        info!(expires_in = record.expires_in, "Login complete");
        session.replace(record)
    }

    /// Change the password of the logged-in user. Both passwords are given
    /// as typed; the prefix is added here.
    pub async fn change_password<S: CredentialStore>(
        &self,
        session: &Session<S>,
        current: &str,
        proposed: &str,
    ) -> Result<(), SessionError> {
        let record = session.require()?;
        self.client
            .change_password(
                &record.access_token,
                &self.prefixed_password(current),
                &self.prefixed_password(proposed),
            )
            .await?;
        info!("Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{sample_record, MemoryStore};
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authenticator_for(server: &MockServer) -> Authenticator {
        let mut config = Config::default();
        config.identity.endpoint = server.uri();
        let client = IdentityClient::new(&config).expect("client should build");
        Authenticator::new(client, &config.identity)
    }

    async fn mount_challenge(server: &MockServer) {
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSCognitoIdentityProviderService.InitiateAuth"))
            .and(body_partial_json(json!({
                "AuthParameters": {"USERNAME": "+595981123456", "PASSWORD": "COGhunter2"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ChallengeName": "SMS_MFA",
                "Session": "sess-1",
                "ChallengeParameters": {"CODE_DELIVERY_DESTINATION": "+********3456"}
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_normalize_username() {
        let auth = Authenticator::new(
            IdentityClient::with_client(reqwest::Client::new(), &Config::default()),
            &IdentityConfig::default(),
        );
        assert_eq!(auth.normalize_username("+595981123456"), "+595981123456");
        assert_eq!(auth.normalize_username("981123456"), "+595981123456");
        assert_eq!(auth.normalize_username("+981123456"), "+595981123456");
        assert_eq!(auth.normalize_username(" 981123456 "), "+595981123456");
    }

    #[tokio::test]
    async fn test_full_login_writes_record() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("POST"))
            .and(header(
                "X-Amz-Target",
                "AWSCognitoIdentityProviderService.RespondToAuthChallenge",
            ))
            .and(body_partial_json(json!({
                "Session": "sess-1",
                "ChallengeResponses": {"USERNAME": "+595981123456", "SMS_MFA_CODE": "123456"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AuthenticationResult": {
                    "AccessToken": "A", "IdToken": "I", "RefreshToken": "R",
                    "ExpiresIn": 3600, "TokenType": "Bearer"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::with_record(sample_record());
        let mut session = Session::open(&store).expect("open");
        let auth = authenticator_for(&server);

        let challenge = auth.start("981123456", "hunter2").await.expect("challenge");
        assert_eq!(challenge.destination(), Some("+********3456"));

        auth.complete(&mut session, challenge, " 123456\n")
            .await
            .expect("login should complete");

        let stored = store.snapshot().expect("record stored");
        assert_eq!(stored.access_token, "A");
        assert_eq!(stored.refresh_token, "R");
        assert_eq!(stored.expires_in, 3600);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_start_without_challenge_is_unexpected_and_stores_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ChallengeParameters": {}
            })))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let session = Session::open(&store).expect("open");
        let err = authenticator_for(&server)
            .start("+595981123456", "pw")
            .await
            .expect_err("should fail");

        assert!(matches!(err, SessionError::Api(ApiError::UnexpectedResponse(_))));
        assert!(session.record().is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_start_with_other_challenge_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ChallengeName": "NEW_PASSWORD_REQUIRED",
                "Session": "s"
            })))
            .mount(&server)
            .await;

        let err = authenticator_for(&server)
            .start("+595981123456", "pw")
            .await
            .expect_err("should fail");
        assert!(matches!(err, SessionError::Api(ApiError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_bad_code_leaves_store_untouched() {
        let server = MockServer::start().await;
        mount_challenge(&server).await;
        Mock::given(method("POST"))
            .and(header(
                "X-Amz-Target",
                "AWSCognitoIdentityProviderService.RespondToAuthChallenge",
            ))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "CodeMismatchException",
                "message": "Invalid code received for user"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::with_record(sample_record());
        let mut session = Session::open(&store).expect("open");
        let auth = authenticator_for(&server);

        let challenge = auth.start("+595981123456", "hunter2").await.expect("challenge");
        let err = auth
            .complete(&mut session, challenge, "000000")
            .await
            .expect_err("bad code");

        assert!(err.requires_login());
        assert_eq!(store.save_count(), 0);
        assert_eq!(session.record(), Some(&sample_record()));
    }

    #[tokio::test]
    async fn test_change_password_adds_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "AWSCognitoIdentityProviderService.ChangePassword"))
            .and(body_partial_json(json!({
                "AccessToken": "A0",
                "PreviousPassword": "COGold",
                "ProposedPassword": "COGnew"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.identity.management_endpoint = server.uri();
        let auth = Authenticator::new(
            IdentityClient::new(&config).expect("client should build"),
            &config.identity,
        );
        let store = MemoryStore::with_record(sample_record());
        let session = Session::open(&store).expect("open");

        auth.change_password(&session, "old", "new")
            .await
            .expect("change should succeed");
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let mut config = Config::default();
        // Nothing listens on port 9 locally
        config.identity.endpoint = "http://127.0.0.1:9/".to_string();
        let auth = Authenticator::new(
            IdentityClient::new(&config).expect("client"),
            &config.identity,
        );

        match auth.start("+595981123456", "pw").await {
            Err(SessionError::Api(e)) => assert!(e.is_transport()),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
