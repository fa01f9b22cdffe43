//! Wire types for the device-authorization endpoints

use serde::{Deserialize, Serialize};

/// Grant type required by the token endpoint
pub const GRANT_TYPE_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Body of `POST /device/code`
#[derive(Debug, Deserialize)]
pub struct DeviceCodeRequest {
    pub client_id: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Response of `POST /device/code`
#[derive(Debug, Serialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Body of `POST /device/token`
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub device_code: String,
    pub client_id: String,
}

/// Successful response of `POST /device/token`
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_in: u64,
}

/// OAuth error body shared by the token and userinfo endpoints
#[derive(Debug, Serialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: String,
}

/// Body of `POST /device/approve`. This endpoint stands in for a hosted
/// approval page: it records the decision a user would make there.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub user_code: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub deny: bool,
}

/// Response of `GET /oauth/userinfo`
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}
