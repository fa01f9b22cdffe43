//! Quill - a device-flow-authenticated AI chat CLI
//!
//! The `quill` binary handles login and the interactive sessions; the crate
//! can also be used as a library for driving streaming model turns.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quill::config::ModelConfig;
//! use quill::llm::{self, ChatEvent, Message, ModelClient};
//! use quill::tools::{ToolRegistry, ToolSelection};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(ModelClient::new(&ModelConfig::default(), "sk-...")?);
//!     let registry = Arc::new(ToolRegistry::new());
//!
//!     let mut stream = llm::send_message(
//!         client,
//!         registry,
//!         ToolSelection::none(),
//!         None,
//!         vec![Message::user("What is the capital of France?")],
//!         llm::MAX_TOOL_STEPS,
//!     );
//!
//!     while let Some(event) = stream.next_event().await {
//!         if let ChatEvent::TextDelta(text) = event {
//!             print!("{text}");
//!         }
//!     }
//!
//!     let outcome = stream.finish().await?;
//!     println!("\n\nTokens used: {}", outcome.usage.output_tokens);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod chat;
pub mod commands;
pub mod config;
pub mod llm;
pub mod scaffold;
pub mod store;
pub mod tools;

// Re-export the pieces library callers reach for most
pub use chat::Session;
pub use config::Config;
pub use llm::{ChatEvent, ChatOutcome, ChatStream};
pub use tools::{Tool, ToolRegistry, ToolSelection};
