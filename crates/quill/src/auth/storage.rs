//! Token persistence for the device-authorization flow

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::device::TokenGrant;

/// Safety margin applied when deciding whether a token is still usable
const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// Persisted token record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Normalize a raw token grant into the stored shape
    pub fn from_grant(grant: TokenGrant) -> Self {
        let now = Utc::now();
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            scope: grant.scope,
            expires_at: grant
                .expires_in
                .map(|secs| now + Duration::seconds(secs as i64)),
            created_at: now,
        }
    }

    /// Whether the token is within the expiry buffer of its deadline.
    /// A record without an expiry timestamp is treated as expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Utc::now() < Duration::seconds(EXPIRY_BUFFER_SECS),
            None => true,
        }
    }
}

/// Token storage handler
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a token store at the default location (~/.quill/token.json)
    pub fn new() -> Result<Self> {
        let data_dir = crate::config::Config::ensure_data_dir()?;
        Ok(Self {
            path: data_dir.join("token.json"),
        })
    }

    /// Create a token store with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the stored token. Missing or unreadable files yield None so
    /// callers route to re-authentication instead of crashing.
    pub fn load(&self) -> Option<TokenRecord> {
        if !self.path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring corrupt token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Save a token record
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create token directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(record).context("Failed to serialize token record")?;

        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write token file: {}", self.path.display()))?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions)?;
        }

        Ok(())
    }

    /// Remove the stored token. An already-absent record is a success.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove token file: {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Whether no usable token is stored
    pub fn is_expired(&self) -> bool {
        match self.load() {
            Some(record) => record.is_expired(),
            None => true,
        }
    }
}
