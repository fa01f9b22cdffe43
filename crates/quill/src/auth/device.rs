//! Device authorization client (OAuth 2.0 Device Authorization Grant)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_SCOPE: &str = "openid profile email";

/// Device code response from the auth server
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: u32,
    pub interval: u32,
}

/// Raw token grant returned by the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
}

/// Authenticated user identity from the userinfo endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Error body returned by OAuth endpoints
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Outcome of a failed token exchange.
///
/// `AuthorizationPending` and `SlowDown` are normal polling signals, not
/// failures; the poller keeps going on them. Everything else is terminal.
#[derive(Debug, Error)]
pub enum DeviceFlowError {
    #[error("authorization pending")]
    AuthorizationPending,
    #[error("server requested a slower polling interval")]
    SlowDown,
    #[error("access denied by user")]
    AccessDenied,
    #[error("device code expired")]
    ExpiredToken,
    #[error("token exchange failed: {code}")]
    Rejected {
        code: String,
        detail: Option<String>,
    },
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeviceFlowError {
    fn from_code(code: String, detail: Option<String>) -> Self {
        match code.as_str() {
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" => Self::AccessDenied,
            "expired_token" => Self::ExpiredToken,
            _ => Self::Rejected { code, detail },
        }
    }
}

/// Client for the auth server's device-authorization endpoints
#[derive(Debug)]
pub struct DeviceAuthClient {
    server_url: String,
    client_id: String,
    http_client: reqwest::Client,
}

impl DeviceAuthClient {
    /// Create a client for the given auth server
    pub fn new(server_url: &str, client_id: &str) -> Result<Self> {
        let parsed = url::Url::parse(server_url)
            .with_context(|| format!("Invalid server URL: {server_url}"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Unsupported server URL scheme: {}", parsed.scheme());
        }

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            http_client,
        })
    }

    /// Request a device code to begin the authorization flow
    pub async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let response = self
            .http_client
            .post(format!("{}/device/code", self.server_url))
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "scope": DEVICE_SCOPE,
            }))
            .send()
            .await
            .context("Failed to request device code")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Device code request failed ({status}): {body}");
        }

        response
            .json()
            .await
            .context("Failed to parse device code response")
    }

    /// Attempt to exchange the device code for a token.
    ///
    /// Errors carry the OAuth error code so the poller can distinguish the
    /// retry signals from the terminal ones.
    pub async fn exchange_device_code(&self, device_code: &str) -> Result<TokenGrant, DeviceFlowError> {
        let response = self
            .http_client
            .post(format!("{}/device/token", self.server_url))
            .json(&serde_json::json!({
                "grant_type": GRANT_TYPE_DEVICE_CODE,
                "device_code": device_code,
                "client_id": self.client_id,
            }))
            .send()
            .await
            .map_err(|e| DeviceFlowError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let body: OAuthErrorBody = response.json().await.unwrap_or(OAuthErrorBody {
                error: "unknown".to_string(),
                error_description: None,
            });
            return Err(DeviceFlowError::from_code(body.error, body.error_description));
        }

        response
            .json()
            .await
            .map_err(|e| DeviceFlowError::Transport(format!("invalid token response: {e}")))
    }

    /// Fetch the identity of the user the access token belongs to
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http_client
            .get(format!("{}/oauth/userinfo", self.server_url))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to reach userinfo endpoint")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Session is no longer valid. Run `quill login` to re-authenticate.");
        }
        if !response.status().is_success() {
            let status = response.status();
            anyhow::bail!("Userinfo request failed ({status})");
        }

        response
            .json()
            .await
            .context("Failed to parse userinfo response")
    }
}
