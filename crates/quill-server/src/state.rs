//! In-memory device-authorization state
//!
//! Tracks pending authorizations by device code, the user-code lookup used by
//! the approval endpoint, and the access tokens issued after approval.
//! Everything lives in process memory; restarting the server voids all codes
//! and tokens.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;

const HEX_CHARS: &[u8] = b"0123456789abcdef";
/// Consonant set that avoids spelling accidental words
const USER_CODE_CHARS: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";

/// Issuance settings shared by all endpoints
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL advertised in verification URIs
    pub public_url: String,
    /// Lifetime of issued access tokens
    pub token_ttl_secs: u64,
    /// Lifetime of unredeemed device codes
    pub device_code_ttl_secs: u64,
    /// Minimum seconds between polls of the token endpoint
    pub interval_secs: u64,
}

/// Identity attached to an approval
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl UserAccount {
    /// Placeholder identity for approvals that don't name a user
    pub fn anonymous() -> Self {
        Self {
            id: format!("user-{}", random_hex(8)),
            name: "Dev User".to_string(),
            email: "dev@example.com".to_string(),
        }
    }
}

/// Codes handed out by the device-code endpoint
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    pub device_code: String,
    pub user_code: String,
}

/// An issued token grant
#[derive(Debug)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: Option<String>,
    pub expires_in: u64,
}

/// Result of one poll of the token endpoint
#[derive(Debug)]
pub enum PollOutcome {
    Granted(Grant),
    Pending,
    SlowDown,
    Denied,
    Expired,
    UnknownCode,
}

#[derive(Debug, Clone)]
enum Decision {
    Pending,
    Approved(UserAccount),
    Denied,
}

struct Authorization {
    user_code: String,
    scope: Option<String>,
    decision: Decision,
    expires_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
}

struct IssuedToken {
    user: UserAccount,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    /// Pending authorizations by device code
    authorizations: HashMap<String, Authorization>,
    /// User code to device code lookup for the approval endpoint
    user_codes: HashMap<String, String>,
    /// Issued tokens by access token
    tokens: HashMap<String, IssuedToken>,
}

/// Shared server state
pub struct AppState {
    pub config: ServerConfig,
    inner: Mutex<Inner>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a new pending authorization and hand out its codes
    pub async fn register_device(&self, scope: Option<String>) -> RegisteredDevice {
        let device_code = random_hex(32);
        let user_code = random_user_code();
        let expires_at = Utc::now() + Duration::seconds(self.config.device_code_ttl_secs as i64);

        let mut inner = self.inner.lock().await;
        inner
            .user_codes
            .insert(user_code.clone(), device_code.clone());
        inner.authorizations.insert(
            device_code.clone(),
            Authorization {
                user_code: user_code.clone(),
                scope,
                decision: Decision::Pending,
                expires_at,
                last_polled_at: None,
            },
        );

        info!("Registered device code {device_code} with user code {user_code}");
        RegisteredDevice {
            device_code,
            user_code,
        }
    }

    /// Advance one poll of the token endpoint. The entry is taken out up
    /// front; only the non-terminal outcomes put it back.
    pub async fn poll_token(&self, device_code: &str) -> PollOutcome {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        let Some(mut auth) = inner.authorizations.remove(device_code) else {
            return PollOutcome::UnknownCode;
        };

        if now > auth.expires_at {
            inner.user_codes.remove(&auth.user_code);
            return PollOutcome::Expired;
        }

        let min_gap = Duration::seconds(self.config.interval_secs as i64);
        let too_fast = auth.last_polled_at.is_some_and(|last| now - last < min_gap);
        auth.last_polled_at = Some(now);
        if too_fast {
            inner.authorizations.insert(device_code.to_string(), auth);
            return PollOutcome::SlowDown;
        }

        match auth.decision.clone() {
            Decision::Pending => {
                inner.authorizations.insert(device_code.to_string(), auth);
                PollOutcome::Pending
            }
            Decision::Denied => {
                inner.user_codes.remove(&auth.user_code);
                PollOutcome::Denied
            }
            Decision::Approved(user) => {
                inner.user_codes.remove(&auth.user_code);

                let grant = Grant {
                    access_token: random_hex(48),
                    refresh_token: random_hex(48),
                    scope: auth.scope,
                    expires_in: self.config.token_ttl_secs,
                };
                inner.tokens.insert(
                    grant.access_token.clone(),
                    IssuedToken {
                        user: user.clone(),
                        expires_at: now + Duration::seconds(self.config.token_ttl_secs as i64),
                    },
                );

                info!("Issued access token for user {} ({})", user.name, user.id);
                PollOutcome::Granted(grant)
            }
        }
    }

    /// Record the user's decision for a user code. Returns false when the
    /// code is unknown, already redeemed, or past its deadline.
    pub async fn approve(&self, user_code: &str, user: UserAccount, deny: bool) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(device_code) = inner.user_codes.get(user_code).cloned() else {
            return false;
        };
        let Some(auth) = inner.authorizations.get_mut(&device_code) else {
            return false;
        };
        if Utc::now() > auth.expires_at {
            return false;
        }

        auth.decision = if deny {
            Decision::Denied
        } else {
            Decision::Approved(user)
        };
        true
    }

    /// Resolve an access token to its user, if the token is still valid
    pub async fn userinfo(&self, access_token: &str) -> Option<UserAccount> {
        let inner = self.inner.lock().await;
        let token = inner.tokens.get(access_token)?;
        if Utc::now() > token.expires_at {
            return None;
        }
        Some(token.user.clone())
    }
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Eight consonants in two dash-separated groups, e.g. `BKQD-TSGX`
fn random_user_code() -> String {
    let mut rng = rand::thread_rng();
    let mut chunk = || -> String {
        (0..4)
            .map(|_| USER_CODE_CHARS[rng.gen_range(0..USER_CODE_CHARS.len())] as char)
            .collect()
    };
    format!("{}-{}", chunk(), chunk())
}
