//! HTTP client for the hosted model API

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;

use crate::config::ModelConfig;

use super::stream::ModelStream;
use super::types::{
    ApiErrorBody, CreateMessageRequest, CreateMessageResponse, Message, ToolChoice,
    ToolDefinition,
};

const API_VERSION: &str = "2023-06-01";

/// Client for the messages endpoint
pub struct ModelClient {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ModelClient {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.name.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).context("Invalid API key")?,
        );
        Ok(headers)
    }

    async fn post_messages(&self, request: &CreateMessageRequest) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.api_base))
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => bail!("API error ({}): {}", status, parsed.error.message),
                Err(_) => bail!("API error ({}): {}", status, body),
            }
        }

        Ok(response)
    }

    /// Create a message (non-streaming)
    pub async fn create_message(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolDefinition],
        tool_choice: Option<ToolChoice>,
    ) -> Result<CreateMessageResponse> {
        let request = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.map(str::to_string),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice,
            stream: false,
        };

        let response = self.post_messages(&request).await?;
        response
            .json()
            .await
            .context("Failed to parse API response")
    }

    /// Create a message and stream the response
    pub async fn create_message_stream(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelStream> {
        let request = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.map(str::to_string),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: None,
            stream: true,
        };

        let response = self.post_messages(&request).await?;
        Ok(ModelStream::new(response))
    }

    /// One non-streaming call forced through a single tool whose input schema
    /// is the target shape; the tool input deserializes into `T`.
    pub async fn generate_object<T: DeserializeOwned>(
        &self,
        system: Option<&str>,
        prompt: &str,
        tool: ToolDefinition,
    ) -> Result<T> {
        let tool_name = tool.name.clone();
        let response = self
            .create_message(
                system,
                &[Message::user(prompt)],
                std::slice::from_ref(&tool),
                Some(ToolChoice::Tool {
                    name: tool_name.clone(),
                }),
            )
            .await?;

        let tool_use = response
            .tool_uses()
            .into_iter()
            .find(|tool_use| tool_use.name == tool_name)
            .with_context(|| format!("Model response did not invoke the {tool_name} tool"))?;

        serde_json::from_value(tool_use.input.clone())
            .context("Generated object did not match the expected shape")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    fn test_config(server: &MockServer) -> ModelConfig {
        ModelConfig {
            name: "test-model".to_string(),
            api_base: server.base_url(),
            api_key: None,
            max_tokens: 512,
        }
    }

    #[tokio::test]
    async fn test_create_message_parses_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", "2023-06-01")
                .json_body_partial(r#"{"model": "test-model", "max_tokens": 512}"#);
            then.status(200).json_body(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hello there"}],
                "model": "test-model",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 25}
            }));
        });

        let client = ModelClient::new(&test_config(&server), "test-key").unwrap();
        let response = client
            .create_message(None, &[Message::user("hi")], &[], None)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.text(), "Hello there");
        assert_eq!(response.usage.total(), 35);
    }

    #[tokio::test]
    async fn test_error_body_surfaces_status_and_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(529).json_body(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            }));
        });

        let client = ModelClient::new(&test_config(&server), "test-key").unwrap();
        let err = client
            .create_message(None, &[Message::user("hi")], &[], None)
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("API error (529"), "got: {message}");
        assert!(message.contains("Overloaded"), "got: {message}");
    }

    #[tokio::test]
    async fn test_generate_object_forces_and_parses_tool_input() {
        #[derive(Debug, Deserialize)]
        struct Plan {
            title: String,
            steps: Vec<String>,
        }

        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .json_body_partial(r#"{"tool_choice": {"type": "tool", "name": "emit_plan"}}"#);
            then.status(200).json_body(json!({
                "id": "msg_2",
                "type": "message",
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "emit_plan",
                    "input": {"title": "Weekend", "steps": ["pack", "go"]}
                }],
                "model": "test-model",
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 5, "output_tokens": 30}
            }));
        });

        let client = ModelClient::new(&test_config(&server), "test-key").unwrap();
        let tool = ToolDefinition {
            name: "emit_plan".to_string(),
            description: "Emit a plan".to_string(),
            input_schema: json!({"type": "object"}),
        };
        let plan: Plan = client
            .generate_object(None, "plan my weekend", tool)
            .await
            .unwrap();

        mock.assert();
        assert_eq!(plan.title, "Weekend");
        assert_eq!(plan.steps, vec!["pack", "go"]);
    }

    #[tokio::test]
    async fn test_generate_object_requires_tool_invocation() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(200).json_body(json!({
                "id": "msg_3",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "I cannot do that"}],
                "model": "test-model",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 5, "output_tokens": 8}
            }));
        });

        let client = ModelClient::new(&test_config(&server), "test-key").unwrap();
        let tool = ToolDefinition {
            name: "emit_plan".to_string(),
            description: "Emit a plan".to_string(),
            input_schema: json!({"type": "object"}),
        };
        let err = client
            .generate_object::<serde_json::Value>(None, "plan", tool)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("did not invoke"));
    }
}
