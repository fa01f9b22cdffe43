//! SSE streaming for the model API
//!
//! The transport delivers server-sent events separated by blank lines. The
//! stream is consumed pull-style: `ModelStream::next_event` buffers transport
//! chunks until a complete frame is available, then parses it into a
//! [`ModelEvent`]. `StreamedResponse` folds the event sequence back into
//! content blocks.

use anyhow::{Context, Result};
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;

use super::types::{ContentBlock, StopReason, ToolUse, Usage};

/// A parsed streaming event
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// A content block opened at the given index
    BlockStart { index: usize, block: BlockStart },
    /// Text appended to the block at the given index
    TextDelta { index: usize, text: String },
    /// Partial tool-input JSON appended to the block at the given index
    InputJsonDelta { index: usize, partial_json: String },
    /// The block at the given index is complete
    BlockStop { index: usize },
    /// Terminal metadata for the message
    Completion {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },
    /// The message is finished; no further events follow
    Done,
    /// The API reported an in-stream error
    Error { message: String },
}

/// Kind of content block opened by a block-start event
#[derive(Debug, Clone)]
pub enum BlockStart {
    Text,
    ToolUse { id: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: RawBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: RawDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: RawCompletion,
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: RawFailure,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text { text: String },
    ToolUse { id: String, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct RawCompletion {
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
struct RawFailure {
    message: String,
}

/// Remove the next complete frame from the buffer, if one is present.
/// Frames are separated by a blank line.
pub(crate) fn take_frame(buffer: &mut String) -> Option<String> {
    let boundary = buffer.find("\n\n")?;
    let frame = buffer[..boundary].to_string();
    buffer.drain(..boundary + 2);
    Some(frame)
}

/// Parse one SSE frame into a model event. Frames that carry nothing the
/// consumer acts on (pings, message_start) yield None.
pub(crate) fn parse_frame(frame: &str) -> Option<ModelEvent> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    if data.is_empty() {
        return None;
    }

    let raw: RawEvent = serde_json::from_str(&data.join("\n")).ok()?;
    match raw {
        RawEvent::MessageStart | RawEvent::Ping => None,
        RawEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            let block = match content_block {
                RawBlock::Text { .. } => BlockStart::Text,
                RawBlock::ToolUse { id, name } => BlockStart::ToolUse { id, name },
            };
            Some(ModelEvent::BlockStart { index, block })
        }
        RawEvent::ContentBlockDelta { index, delta } => Some(match delta {
            RawDelta::TextDelta { text } => ModelEvent::TextDelta { index, text },
            RawDelta::InputJsonDelta { partial_json } => ModelEvent::InputJsonDelta {
                index,
                partial_json,
            },
        }),
        RawEvent::ContentBlockStop { index } => Some(ModelEvent::BlockStop { index }),
        RawEvent::MessageDelta { delta, usage } => Some(ModelEvent::Completion {
            stop_reason: delta.stop_reason,
            usage,
        }),
        RawEvent::MessageStop => Some(ModelEvent::Done),
        RawEvent::Error { error } => Some(ModelEvent::Error {
            message: error.message,
        }),
    }
}

/// Pull-style reader over a streaming model response
pub struct ModelStream {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: String,
}

impl ModelStream {
    pub fn new(response: reqwest::Response) -> Self {
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Self {
            chunks,
            buffer: String::new(),
        }
    }

    /// Next event from the stream, or None once the transport is drained
    pub async fn next_event(&mut self) -> Result<Option<ModelEvent>> {
        loop {
            while let Some(frame) = take_frame(&mut self.buffer) {
                if let Some(event) = parse_frame(&frame) {
                    return Ok(Some(event));
                }
            }

            match self.chunks.next().await {
                Some(chunk) => {
                    let chunk = chunk.context("Failed to read stream chunk")?;
                    self.buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Accumulates streamed events back into a complete response
#[derive(Debug, Default)]
pub struct StreamedResponse {
    blocks: Vec<BlockBuilder>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

#[derive(Debug)]
enum BlockBuilder {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
}

impl StreamedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulated state
    pub fn apply(&mut self, event: &ModelEvent) {
        match event {
            ModelEvent::BlockStart { index, block } => {
                while self.blocks.len() <= *index {
                    self.blocks.push(BlockBuilder::Text(String::new()));
                }
                self.blocks[*index] = match block {
                    BlockStart::Text => BlockBuilder::Text(String::new()),
                    BlockStart::ToolUse { id, name } => BlockBuilder::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input_json: String::new(),
                    },
                };
            }
            ModelEvent::TextDelta { index, text } => {
                if let Some(BlockBuilder::Text(s)) = self.blocks.get_mut(*index) {
                    s.push_str(text);
                }
            }
            ModelEvent::InputJsonDelta {
                index,
                partial_json,
            } => {
                if let Some(BlockBuilder::ToolUse { input_json, .. }) = self.blocks.get_mut(*index)
                {
                    input_json.push_str(partial_json);
                }
            }
            ModelEvent::Completion { stop_reason, usage } => {
                self.stop_reason = *stop_reason;
                if let Some(usage) = usage {
                    self.usage = *usage;
                }
            }
            ModelEvent::BlockStop { .. } | ModelEvent::Done | ModelEvent::Error { .. } => {}
        }
    }

    /// Concatenated text accumulated so far
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                BlockBuilder::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Finish accumulation, producing the response content blocks.
    /// Tool input arrives as concatenated JSON fragments and is parsed here;
    /// unparseable input degrades to null rather than dropping the call.
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        self.blocks
            .into_iter()
            .filter_map(|block| match block {
                BlockBuilder::Text(text) if text.is_empty() => None,
                BlockBuilder::Text(text) => Some(ContentBlock::Text { text }),
                BlockBuilder::ToolUse {
                    id,
                    name,
                    input_json,
                } => {
                    let input =
                        serde_json::from_str(&input_json).unwrap_or(serde_json::Value::Null);
                    Some(ContentBlock::ToolUse(ToolUse { id, name, input }))
                }
            })
            .collect()
    }
}
