//! HTTP endpoints for the device-authorization flow

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::protocol::{
    ApproveRequest, DeviceCodeRequest, DeviceCodeResponse, OAuthError, TokenRequest,
    TokenResponse, UserInfoResponse, GRANT_TYPE_DEVICE_CODE,
};
use crate::state::{AppState, PollOutcome, UserAccount};

/// Assemble the router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/device/code", post(handle_device_code))
        .route("/device/token", post(handle_device_token))
        .route("/device/approve", post(handle_device_approve))
        .route("/oauth/userinfo", get(handle_userinfo))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn run(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Device-authorization server listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server exited unexpectedly")?;
    Ok(())
}

async fn handle_device_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeviceCodeRequest>,
) -> Response {
    let device = state.register_device(request.scope).await;
    info!(
        "Device code issued to client {} (user code {})",
        request.client_id, device.user_code
    );

    let verification_uri = format!("{}/device", state.config.public_url);
    let verification_uri_complete =
        format!("{verification_uri}?user_code={}", device.user_code);
    Json(DeviceCodeResponse {
        device_code: device.device_code,
        user_code: device.user_code,
        verification_uri,
        verification_uri_complete,
        expires_in: state.config.device_code_ttl_secs,
        interval: state.config.interval_secs,
    })
    .into_response()
}

async fn handle_device_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    if request.grant_type != GRANT_TYPE_DEVICE_CODE {
        return oauth_error(
            "unsupported_grant_type",
            format!("Expected grant_type {GRANT_TYPE_DEVICE_CODE}"),
        );
    }
    debug!(
        "Token poll from client {} for device code {}",
        request.client_id, request.device_code
    );

    match state.poll_token(&request.device_code).await {
        PollOutcome::Granted(grant) => Json(TokenResponse {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: "Bearer".to_string(),
            scope: grant.scope,
            expires_in: grant.expires_in,
        })
        .into_response(),
        PollOutcome::Pending => {
            oauth_error("authorization_pending", "The user has not approved this device yet")
        }
        PollOutcome::SlowDown => {
            oauth_error("slow_down", "Polling faster than the declared interval")
        }
        PollOutcome::Denied => oauth_error("access_denied", "The user denied this device"),
        PollOutcome::Expired => oauth_error("expired_token", "The device code has expired"),
        PollOutcome::UnknownCode => oauth_error("invalid_grant", "Unknown device code"),
    }
}

async fn handle_device_approve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApproveRequest>,
) -> Response {
    let fallback = UserAccount::anonymous();
    let user = UserAccount {
        id: request.user_id.unwrap_or(fallback.id),
        name: request.name.unwrap_or(fallback.name),
        email: request.email.unwrap_or(fallback.email),
    };

    let decision = if request.deny { "denied" } else { "approved" };
    if state.approve(&request.user_code, user, request.deny).await {
        info!("User code {} {decision}", request.user_code);
        Json(json!({ "status": decision })).into_response()
    } else {
        warn!("Decision for unknown user code {}", request.user_code);
        (
            StatusCode::NOT_FOUND,
            Json(OAuthError {
                error: "invalid_grant".to_string(),
                error_description: "Unknown or expired user code".to_string(),
            }),
        )
            .into_response()
    }
}

async fn handle_userinfo(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized("Missing bearer token");
    };
    match state.userinfo(token).await {
        Some(user) => Json(UserInfoResponse {
            id: user.id,
            name: user.name,
            email: user.email,
        })
        .into_response(),
        None => unauthorized("Unknown or expired access token"),
    }
}

async fn handle_health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn oauth_error(code: &str, description: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(OAuthError {
            error: code.to_string(),
            error_description: description.into(),
        }),
    )
        .into_response()
}

fn unauthorized(description: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(OAuthError {
            error: "invalid_token".to_string(),
            error_description: description.to_string(),
        }),
    )
        .into_response()
}
