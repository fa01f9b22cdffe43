//! Tools the model can invoke during tool-augmented chat
//!
//! Each tool declares a name, a description, and a JSON schema for its
//! parameters, and executes against local resources (shell, network). Which
//! tools are active is a per-session [`ToolSelection`], chosen when the chat
//! session starts.

pub mod fetch_url;
pub mod run_command;
pub mod web_search;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::ToolDefinition;

pub use fetch_url::FetchUrlTool;
pub use run_command::RunCommandTool;
pub use web_search::WebSearchTool;

/// A tool executable by the chat loop
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> serde_json::Value;

    /// Run the tool. `Err` carries a message fed back to the model as an
    /// error tool result.
    async fn execute(&self, params: serde_json::Value) -> Result<String, String>;
}

/// Registry of available tools, iterated in registration order
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Registry with the built-in tool set
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(WebSearchTool::new()));
        registry.register(Arc::new(RunCommandTool::new()));
        registry.register(Arc::new(FetchUrlTool::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Definitions for the tools enabled by the selection, in registration
    /// order
    pub fn definitions(&self, selection: &ToolSelection) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter(|name| selection.enabled(name))
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of tools enabled for one chat session
#[derive(Debug, Clone, Default)]
pub struct ToolSelection(Vec<String>);

impl ToolSelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// Largest index <= `max_bytes` that falls on a char boundary of `text`
pub(crate) fn clip_to_boundary(text: &str, max_bytes: usize) -> usize {
    let mut end = max_bytes.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}
