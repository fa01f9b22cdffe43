//! Model API client, streaming transport, and chat turn execution

mod chat;
mod client;
mod stream;
mod types;

pub use chat::{
    send_message, ChatEvent, ChatOutcome, ChatStream, ToolCallRecord, ToolResultRecord,
    MAX_TOOL_STEPS,
};
pub use client::ModelClient;
pub use stream::{ModelEvent, ModelStream, StreamedResponse};
pub use types::{
    ContentBlock, CreateMessageResponse, Message, Role, StopReason, ToolChoice, ToolDefinition,
    ToolOutput, ToolUse, Usage,
};
