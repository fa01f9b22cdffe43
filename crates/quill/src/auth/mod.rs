//! Device-flow authentication: wire client, token persistence, and polling

pub mod device;
pub mod poller;
pub mod storage;

pub use device::{DeviceAuthClient, DeviceCodeResponse, DeviceFlowError, TokenGrant, UserInfo};
pub use poller::{DevicePoller, PollError, PollState, Sleeper, TokenExchange, TokioSleeper};
pub use storage::{TokenRecord, TokenStore};
