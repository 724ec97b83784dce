//! API client for the account operations REST API.
//!
//! Requests carry the session token in the `authorization` header (raw, no
//! scheme) and the deployment's key in `x-api-key`.

use anyhow::Context;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::models::{AcceptResult, AccountInfo, AccountNumber, PendingOperation, StatusPatch};

use super::ApiError;

/// API client for account lookups and pending-operation approval.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.identity.device.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            api_key: config.api.api_key.clone(),
            token: None,
        }
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            token: Some(token),
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(token)
                    .map_err(|_| ApiError::InvalidResponse("session token is not a valid header value".to_string()))?,
            );
        }
        if let Some(ref key) = self.api_key {
            headers.insert(
                "x-api-key",
                header::HeaderValue::from_str(key)
                    .map_err(|_| ApiError::InvalidResponse("API key is not a valid header value".to_string()))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Read and parse a JSON body, surfacing the raw text when it does not parse.
    async fn parse_body<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::unexpected(&format!("failed to parse {what} ({e})"), &text))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, ApiError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_body(response, what).await
    }

    // ===== Account Operations =====

    /// Fetch account information for an account number
    pub async fn fetch_account_info(&self, number: &AccountNumber) -> Result<AccountInfo, ApiError> {
        let url = format!("{}/accounts/msisdn/{}/accountinfo", self.base_url, number);
        self.get(&url, "account info").await
    }

    /// Fetch operations awaiting approval. An empty or `null` body means none.
    pub async fn fetch_pending_operations(
        &self,
        number: &AccountNumber,
    ) -> Result<Vec<PendingOperation>, ApiError> {
        let url = format!("{}/accounts/msisdn/{}/pendingoperations", self.base_url, number);
        let operations: Option<Vec<PendingOperation>> = self.get(&url, "pending operations").await?;
        Ok(operations.unwrap_or_default())
    }

    /// Confirm a pending operation by its reference
    pub async fn accept_pending_operation(&self, reference: &str) -> Result<AcceptResult, ApiError> {
        let url = format!("{}/accounts/pendingoperations/{}", self.base_url, reference);
        debug!(url, "PATCH");

        let response = self
            .client
            .patch(&url)
            .headers(self.auth_headers()?)
            .json(&StatusPatch::CONFIRM)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            // 204 No Content still confirms the operation
            return Ok(AcceptResult::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::unexpected(&format!("failed to parse accept result ({e})"), &text))
    }
}
