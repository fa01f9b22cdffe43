//! Chat turn execution: streaming, tool rounds, event delivery
//!
//! A turn runs in a producer task that drives the model transport and pushes
//! typed events into a bounded channel. The caller renders events as they
//! arrive, then collects the aggregate outcome from the task's join handle.
//! The bounded channel backpressures the producer when rendering is slow.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::tools::{ToolRegistry, ToolSelection};

use super::client::ModelClient;
use super::stream::{ModelEvent, StreamedResponse};
use super::types::{ContentBlock, Message, StopReason, ToolOutput, Usage};

/// Cap on model round-trips within a single turn
pub const MAX_TOOL_STEPS: u32 = 5;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Typed events delivered while a turn is in flight
#[derive(Debug, Clone)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCall(ToolCallRecord),
    ToolResult(ToolResultRecord),
}

/// One tool invocation issued by the model
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The local execution result paired with one tool invocation
#[derive(Debug, Clone)]
pub struct ToolResultRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// Aggregate result of a completed turn
#[derive(Debug)]
pub struct ChatOutcome {
    /// Every streamed text delta concatenated, across all rounds
    pub content: String,
    pub finish_reason: Option<StopReason>,
    pub usage: Usage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_results: Vec<ToolResultRecord>,
}

/// Handle to an in-flight chat turn
pub struct ChatStream {
    events: mpsc::Receiver<ChatEvent>,
    handle: JoinHandle<Result<ChatOutcome>>,
}

impl ChatStream {
    /// Next event, or None once the producer has finished
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Wait for the turn to complete and return the aggregate outcome
    pub async fn finish(self) -> Result<ChatOutcome> {
        let Self { events, handle } = self;
        // Closing the receiver unblocks a producer still sending events
        drop(events);
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => bail!("Chat task failed: {e}"),
        }
    }
}

/// Start one chat turn against the model.
///
/// `history` must end with the user's newest message. When the selection
/// enables tools, the turn interleaves model rounds with local tool
/// execution, bounded at `max_steps` model rounds.
pub fn send_message(
    client: Arc<ModelClient>,
    registry: Arc<ToolRegistry>,
    selection: ToolSelection,
    system: Option<String>,
    history: Vec<Message>,
    max_steps: u32,
) -> ChatStream {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handle = tokio::spawn(run_turn(
        client, registry, selection, system, history, max_steps, tx,
    ));
    ChatStream { events: rx, handle }
}

async fn run_turn(
    client: Arc<ModelClient>,
    registry: Arc<ToolRegistry>,
    selection: ToolSelection,
    system: Option<String>,
    mut messages: Vec<Message>,
    max_steps: u32,
    events: mpsc::Sender<ChatEvent>,
) -> Result<ChatOutcome> {
    let tools = registry.definitions(&selection);
    let mut outcome = ChatOutcome {
        content: String::new(),
        finish_reason: None,
        usage: Usage::default(),
        tool_calls: Vec::new(),
        tool_results: Vec::new(),
    };

    for round in 0..max_steps.max(1) {
        let mut stream = client
            .create_message_stream(system.as_deref(), &messages, &tools)
            .await?;

        let mut acc = StreamedResponse::new();
        while let Some(event) = stream.next_event().await? {
            match &event {
                ModelEvent::Error { message } => bail!("Model stream error: {message}"),
                ModelEvent::TextDelta { text, .. } => {
                    let _ = events.send(ChatEvent::TextDelta(text.clone())).await;
                }
                _ => {}
            }
            let done = matches!(event, ModelEvent::Done);
            acc.apply(&event);
            if done {
                break;
            }
        }

        outcome.usage += acc.usage;
        outcome.finish_reason = acc.stop_reason;
        outcome.content.push_str(&acc.text());

        let blocks = acc.into_blocks();
        let tool_uses: Vec<_> = blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool_use) => Some(tool_use.clone()),
                _ => None,
            })
            .collect();

        if tool_uses.is_empty() {
            break;
        }
        if round + 1 == max_steps {
            // Cap reached: the final round's calls are neither executed nor
            // reported, keeping calls and results paired 1:1.
            warn!("Tool step cap ({max_steps}) reached, ending turn");
            break;
        }

        messages.push(Message::assistant(blocks));

        let mut results = Vec::new();
        for tool_use in tool_uses {
            let call = ToolCallRecord {
                id: tool_use.id.clone(),
                name: tool_use.name.clone(),
                arguments: tool_use.input.clone(),
            };
            let _ = events.send(ChatEvent::ToolCall(call.clone())).await;
            outcome.tool_calls.push(call);

            let enabled = selection.enabled(&tool_use.name);
            let executed = match registry.get(&tool_use.name).filter(|_| enabled) {
                Some(tool) => tool.execute(tool_use.input.clone()).await,
                None => Err(format!("Unknown tool: {}", tool_use.name)),
            };
            let (content, is_error) = match executed {
                Ok(content) => (content, false),
                Err(message) => (message, true),
            };

            let result = ToolResultRecord {
                id: tool_use.id.clone(),
                name: tool_use.name.clone(),
                content: content.clone(),
                is_error,
            };
            let _ = events.send(ChatEvent::ToolResult(result.clone())).await;
            outcome.tool_results.push(result);

            results.push(if is_error {
                ToolOutput::error(tool_use.id, content)
            } else {
                ToolOutput::success(tool_use.id, content)
            });
        }
        messages.push(Message::tool_results(results));
        debug!("Round {} complete, continuing with tool results", round + 1);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::tools::Tool;
    use axum::extract::State;
    use axum::http::header;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted model endpoint: pops one canned SSE payload per request and
    /// records every request body.
    struct Script {
        responses: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<Value>>,
    }

    async fn messages_handler(
        State(script): State<Arc<Script>>,
        Json(body): Json<Value>,
    ) -> ([(header::HeaderName, &'static str); 1], String) {
        script.requests.lock().unwrap().push(body);
        let payload = script
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("more requests than scripted responses");
        ([(header::CONTENT_TYPE, "text/event-stream")], payload)
    }

    async fn spawn_scripted_server(responses: Vec<String>) -> (String, Arc<Script>) {
        let script = Arc::new(Script {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/v1/messages", post(messages_handler))
            .with_state(script.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), script)
    }

    fn scripted_client(base: &str) -> Arc<ModelClient> {
        let config = ModelConfig {
            name: "test-model".to_string(),
            api_base: base.to_string(),
            api_key: None,
            max_tokens: 256,
        };
        Arc::new(ModelClient::new(&config, "test-key").unwrap())
    }

    fn frame(value: Value) -> String {
        format!(
            "event: {}\ndata: {}\n\n",
            value["type"].as_str().unwrap(),
            value
        )
    }

    fn text_response(chunks: &[&str], stop_reason: &str) -> String {
        let mut events = vec![
            json!({"type": "message_start", "message": {"id": "msg_t", "role": "assistant"}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        ];
        for chunk in chunks {
            events.push(json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": chunk}
            }));
        }
        events.push(json!({"type": "content_block_stop", "index": 0}));
        events.push(json!({
            "type": "message_delta",
            "delta": {"stop_reason": stop_reason},
            "usage": {"output_tokens": 7}
        }));
        events.push(json!({"type": "message_stop"}));
        events.into_iter().map(frame).collect()
    }

    fn tool_call_response(text: &str, tool_name: &str, input: &str) -> String {
        let mut events =
            vec![json!({"type": "message_start", "message": {"id": "msg_t", "role": "assistant"}})];
        let mut index = 0;
        if !text.is_empty() {
            events.push(json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}}));
            events.push(json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}}));
            events.push(json!({"type": "content_block_stop", "index": index}));
            index += 1;
        }
        events.push(json!({"type": "content_block_start", "index": index, "content_block": {"type": "tool_use", "id": format!("toolu_{index}"), "name": tool_name, "input": {}}}));
        events.push(json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": input}}));
        events.push(json!({"type": "content_block_stop", "index": index}));
        events.push(json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 11}}));
        events.push(json!({"type": "message_stop"}));
        events.into_iter().map(frame).collect()
    }

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the value back"
        }

        fn schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"value": {"type": "string"}}})
        }

        async fn execute(&self, params: Value) -> Result<String, String> {
            Ok(format!("echo: {}", params["value"].as_str().unwrap_or("")))
        }
    }

    fn echo_registry() -> (Arc<ToolRegistry>, ToolSelection) {
        let mut registry = ToolRegistry::empty();
        registry.register(Arc::new(EchoTool));
        (
            Arc::new(registry),
            ToolSelection::from_names(vec!["echo".to_string()]),
        )
    }

    #[tokio::test]
    async fn test_text_deltas_concatenate_to_content() {
        let (base, _script) =
            spawn_scripted_server(vec![text_response(&["Hel", "lo ", "there"], "end_turn")])
                .await;
        let client = scripted_client(&base);
        let registry = Arc::new(ToolRegistry::empty());

        let mut stream = send_message(
            client,
            registry,
            ToolSelection::none(),
            None,
            vec![Message::user("hi")],
            MAX_TOOL_STEPS,
        );

        let mut streamed = String::new();
        while let Some(event) = stream.next_event().await {
            if let ChatEvent::TextDelta(text) = event {
                streamed.push_str(&text);
            }
        }
        let outcome = stream.finish().await.unwrap();

        assert_eq!(outcome.content, "Hello there");
        assert_eq!(streamed, outcome.content);
        assert_eq!(outcome.finish_reason, Some(StopReason::EndTurn));
        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.usage.output_tokens, 7);
    }

    #[tokio::test]
    async fn test_tool_round_feeds_results_back() {
        let (base, script) = spawn_scripted_server(vec![
            tool_call_response("Checking. ", "echo", r#"{"value":"hi"}"#),
            text_response(&["Done."], "end_turn"),
        ])
        .await;
        let client = scripted_client(&base);
        let (registry, selection) = echo_registry();

        let mut stream = send_message(
            client,
            registry,
            selection,
            None,
            vec![Message::user("go")],
            MAX_TOOL_STEPS,
        );

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        let outcome = stream.finish().await.unwrap();

        assert_eq!(outcome.content, "Checking. Done.");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "echo");
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0].content, "echo: hi");
        assert!(!outcome.tool_results[0].is_error);

        // Streamed tool events mirror the aggregate lists in order
        let streamed_calls: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::ToolCall(call) => Some(call.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed_calls, vec![outcome.tool_calls[0].id.as_str()]);

        // The second request carried the tool result back to the model
        let requests = script.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let last_message = requests[1]["messages"].as_array().unwrap().last().unwrap();
        assert_eq!(last_message["content"][0]["type"], "tool_result");
        assert_eq!(last_message["content"][0]["content"], "echo: hi");
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_result() {
        let (base, _script) = spawn_scripted_server(vec![
            tool_call_response("", "missing_tool", "{}"),
            text_response(&["Recovered."], "end_turn"),
        ])
        .await;
        let client = scripted_client(&base);
        let registry = Arc::new(ToolRegistry::empty());
        let selection = ToolSelection::from_names(vec!["missing_tool".to_string()]);

        let mut stream = send_message(
            client,
            registry,
            selection,
            None,
            vec![Message::user("go")],
            MAX_TOOL_STEPS,
        );
        while stream.next_event().await.is_some() {}
        let outcome = stream.finish().await.unwrap();

        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].is_error);
        assert!(outcome.tool_results[0].content.contains("Unknown tool"));
        assert_eq!(outcome.content, "Recovered.");
    }

    #[tokio::test]
    async fn test_step_cap_bounds_model_rounds() {
        let responses = (0..MAX_TOOL_STEPS)
            .map(|_| tool_call_response("", "echo", r#"{"value":"x"}"#))
            .collect();
        let (base, script) = spawn_scripted_server(responses).await;
        let client = scripted_client(&base);
        let (registry, selection) = echo_registry();

        let mut stream = send_message(
            client,
            registry,
            selection,
            None,
            vec![Message::user("loop")],
            MAX_TOOL_STEPS,
        );
        while stream.next_event().await.is_some() {}
        let outcome = stream.finish().await.unwrap();

        assert_eq!(
            script.requests.lock().unwrap().len(),
            MAX_TOOL_STEPS as usize
        );
        // The cap'th round's calls are not executed: calls and results stay 1:1
        assert_eq!(outcome.tool_calls.len(), MAX_TOOL_STEPS as usize - 1);
        assert_eq!(outcome.tool_results.len(), outcome.tool_calls.len());
        assert_eq!(outcome.finish_reason, Some(StopReason::ToolUse));
    }

    #[tokio::test]
    async fn test_model_error_fails_turn() {
        let payload = format!(
            "{}{}",
            frame(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            frame(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}))
        );
        let (base, _script) = spawn_scripted_server(vec![payload]).await;
        let client = scripted_client(&base);
        let registry = Arc::new(ToolRegistry::empty());

        let stream = send_message(
            client,
            registry,
            ToolSelection::none(),
            None,
            vec![Message::user("hi")],
            MAX_TOOL_STEPS,
        );
        let err = stream.finish().await.unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }
}
