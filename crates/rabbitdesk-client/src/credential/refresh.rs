//! Token endpoint client.
//!
//! [`TokenRefresher`] is the seam the monitor refreshes through.
//! [`OAuthTokenRefresher`] implements it against the console's OAuth token
//! endpoint and also provides the password grant used to log in.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use rabbitdesk_config::ApiConfig;

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Refresh failures. All of them end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("Token endpoint unreachable: {0}")]
    Network(String),

    #[error("Token endpoint rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Exchanges a refresh credential for a new access credential.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError>;
}

/// OAuth 2.0 token endpoint client.
#[derive(Debug, Clone)]
pub struct OAuthTokenRefresher {
    http: reqwest::Client,
    token_url: String,
    client_id: Option<String>,
}

impl OAuthTokenRefresher {
    /// Creates a client for `{base_url}{token_path}`.
    pub fn new(base_url: &str, token_path: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            token_url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                token_path.trim_start_matches('/')
            ),
            client_id: None,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        let mut refresher = Self::new(&config.base_url, &config.token_path, config.request_timeout);
        refresher.client_id = config.client_id.clone();
        refresher
    }

    /// Sends `client_id` with every grant.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Resource owner password grant, used by interactive login.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, RefreshError> {
        self.grant(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn grant(&self, fields: &[(&str, &str)]) -> Result<TokenResponse, RefreshError> {
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in fields {
                form.append_pair(key, value);
            }
            if let Some(client_id) = &self.client_id {
                form.append_pair("client_id", client_id);
            }
            form.finish()
        };

        let resp = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        tracing::debug!(url = %self.token_url, "Requesting token refresh");
        self.grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
