//! Device-authorization polling state machine

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::device::{DeviceAuthClient, DeviceFlowError, TokenGrant};

/// Fixed interval increment applied when the server signals slow_down
const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// States of the polling state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Starting,
    Polling,
    Success,
    Denied,
    Expired,
    FatalError,
}

/// Terminal failure of a polling session. None of these are retryable by
/// the poller itself; the caller may start an entirely new device flow.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("access was denied")]
    Denied,
    #[error("the device code expired before authorization completed")]
    Expired,
    #[error("{0}")]
    Fatal(String),
}

/// One token-exchange attempt against the auth server
#[async_trait]
pub trait TokenExchange {
    async fn exchange(&self, device_code: &str) -> Result<TokenGrant, DeviceFlowError>;
}

#[async_trait]
impl TokenExchange for DeviceAuthClient {
    async fn exchange(&self, device_code: &str) -> Result<TokenGrant, DeviceFlowError> {
        self.exchange_device_code(device_code).await
    }
}

/// Suspension between polls
#[async_trait]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls the token endpoint until the flow reaches a terminal state.
///
/// Every tick is scheduled: the poller sleeps the current interval before
/// each exchange, including the first, and exactly one exchange is in
/// flight at a time.
pub struct DevicePoller<E, S> {
    exchange: E,
    sleeper: S,
    interval: Duration,
    state: PollState,
}

impl<E: TokenExchange, S: Sleeper> DevicePoller<E, S> {
    /// Create a poller with the interval declared by the device-code response
    pub fn new(exchange: E, sleeper: S, interval_secs: u64) -> Self {
        Self {
            exchange,
            sleeper,
            interval: Duration::from_secs(interval_secs),
            state: PollState::Starting,
        }
    }

    /// Current state of the machine
    pub fn state(&self) -> PollState {
        self.state
    }

    /// Current polling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the machine to a terminal state, returning the token on success
    pub async fn run(&mut self, device_code: &str) -> Result<TokenGrant, PollError> {
        self.state = PollState::Polling;

        loop {
            self.sleeper.sleep(self.interval).await;

            match self.exchange.exchange(device_code).await {
                Ok(grant) => {
                    self.state = PollState::Success;
                    return Ok(grant);
                }
                Err(DeviceFlowError::AuthorizationPending) => {
                    debug!("Authorization pending, next poll in {:?}", self.interval);
                }
                Err(DeviceFlowError::SlowDown) => {
                    self.interval += Duration::from_secs(SLOW_DOWN_INCREMENT_SECS);
                    debug!("Server asked to slow down, interval now {:?}", self.interval);
                }
                Err(DeviceFlowError::AccessDenied) => {
                    self.state = PollState::Denied;
                    return Err(PollError::Denied);
                }
                Err(DeviceFlowError::ExpiredToken) => {
                    self.state = PollState::Expired;
                    return Err(PollError::Expired);
                }
                Err(e) => {
                    self.state = PollState::FatalError;
                    return Err(PollError::Fatal(e.to_string()));
                }
            }
        }
    }
}
