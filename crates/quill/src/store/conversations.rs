//! Conversation persistence
//!
//! One JSON document per conversation under `~/.quill/conversations/`, each
//! embedding its message list. Single writer, last write wins; unreadable
//! files are skipped rather than failing a directory scan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{ContentBlock, Message, Role};

const TITLE_MAX_CHARS: usize = 50;

/// Conversation interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Tool,
    Agent,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Tool => "tool",
            Mode::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted conversation with its embedded messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub mode: Mode,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

/// One persisted chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Structured payloads parse back to JSON; plain text returns None
    pub fn structured(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.content).ok()
    }
}

/// Message payload accepted by the store. Structured payloads are serialized
/// to JSON text before storage and recoverable via [`StoredMessage::structured`].
pub enum MessageContent {
    Text(String),
    Structured(serde_json::Value),
}

impl MessageContent {
    fn into_stored(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<serde_json::Value> for MessageContent {
    fn from(value: serde_json::Value) -> Self {
        MessageContent::Structured(value)
    }
}

/// Directory-backed conversation store
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: Config::ensure_data_dir()?.join("conversations"),
        })
    }

    /// Store rooted at an explicit directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn create_conversation(
        &self,
        user_id: &str,
        mode: Mode,
        title: Option<String>,
    ) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            mode,
            title: title.unwrap_or_else(|| format!("New {mode} Conversation")),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.write(&conversation)?;
        Ok(conversation)
    }

    /// Resume by id when it exists and belongs to the user, else create fresh
    pub fn get_or_create_conversation(
        &self,
        user_id: &str,
        id: Option<&str>,
        mode: Mode,
    ) -> Result<Conversation> {
        if let Some(id) = id {
            if let Some(conversation) = self.read(id)? {
                if conversation.user_id == user_id {
                    return Ok(conversation);
                }
            }
        }
        self.create_conversation(user_id, mode, None)
    }

    /// Append a message and bump the conversation's `updated_at`
    pub fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: impl Into<MessageContent>,
    ) -> Result<StoredMessage> {
        let mut conversation = self
            .read(conversation_id)?
            .with_context(|| format!("Conversation {conversation_id} not found"))?;
        let now = Utc::now();
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.into().into_stored(),
            created_at: now,
        };
        conversation.messages.push(message.clone());
        conversation.updated_at = now;
        self.write(&conversation)?;
        Ok(message)
    }

    /// Messages in ascending creation order
    pub fn get_conversation_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let conversation = self
            .read(conversation_id)?
            .with_context(|| format!("Conversation {conversation_id} not found"))?;
        let mut messages = conversation.messages;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    pub fn update_conversation_title(&self, conversation_id: &str, title: &str) -> Result<()> {
        let mut conversation = self
            .read(conversation_id)?
            .with_context(|| format!("Conversation {conversation_id} not found"))?;
        conversation.title = title.to_string();
        conversation.updated_at = Utc::now();
        self.write(&conversation)
    }

    /// Derive and persist the title from the first user message. Applies only
    /// while the conversation holds exactly one message; later calls are no-ops.
    pub fn maybe_set_title(&self, conversation_id: &str, first_message: &str) -> Result<()> {
        let conversation = self
            .read(conversation_id)?
            .with_context(|| format!("Conversation {conversation_id} not found"))?;
        if conversation.messages.len() != 1 {
            return Ok(());
        }
        self.update_conversation_title(conversation_id, &derive_title(first_message))
    }

    /// All of a user's conversations, most recently updated first
    pub fn get_user_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(conversations),
            Err(e) => return Err(e).context("Failed to read conversation directory"),
        };
        for entry in entries {
            let entry = entry.context("Failed to read conversation directory")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(conversation) = Self::parse_file(&path) {
                if conversation.user_id == user_id {
                    conversations.push(conversation);
                }
            }
        }
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// Deletes only when the conversation belongs to the user. Returns whether
    /// anything was removed.
    pub fn delete_conversation(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        match self.read(conversation_id)? {
            Some(conversation) if conversation.user_id == user_id => {
                fs::remove_file(self.path_for(conversation_id)).with_context(|| {
                    format!("Failed to delete conversation {conversation_id}")
                })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read(&self, id: &str) -> Result<Option<Conversation>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::parse_file(&path))
    }

    fn parse_file(path: &Path) -> Option<Conversation> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read conversation file {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(conversation) => Some(conversation),
            Err(e) => {
                warn!("Ignoring unreadable conversation file {}: {e}", path.display());
                None
            }
        }
    }

    fn write(&self, conversation: &Conversation) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create conversation directory")?;
        let json = serde_json::to_string_pretty(conversation)?;
        fs::write(self.path_for(&conversation.id), json)
            .with_context(|| format!("Failed to write conversation {}", conversation.id))
    }
}

/// First 50 characters of the message, with an ellipsis when truncated
fn derive_title(message: &str) -> String {
    let mut title: String = message.chars().take(TITLE_MAX_CHARS).collect();
    if message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Normalize stored messages into model wire messages, oldest first
pub fn format_messages_for_model(messages: &[StoredMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::User => Message::user(message.content.as_str()),
            Role::Assistant => Message::assistant(vec![ContentBlock::Text {
                text: message.content.clone(),
            }]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempdir().unwrap();
        let store = ConversationStore::with_dir(dir.path().join("conversations"));
        (dir, store)
    }

    #[test]
    fn test_create_uses_default_title() {
        let (_dir, store) = store();

        let conversation = store.create_conversation("u1", Mode::Chat, None).unwrap();
        assert_eq!(conversation.title, "New chat Conversation");

        let named = store
            .create_conversation("u1", Mode::Agent, Some("Scaffold run".to_string()))
            .unwrap();
        assert_eq!(named.title, "Scaffold run");
    }

    #[test]
    fn test_resume_returns_owned_conversation() {
        let (_dir, store) = store();
        let created = store.create_conversation("u1", Mode::Chat, None).unwrap();

        let resumed = store
            .get_or_create_conversation("u1", Some(&created.id), Mode::Chat)
            .unwrap();
        assert_eq!(resumed.id, created.id);

        // Another user's id falls through to a fresh conversation
        let other = store
            .get_or_create_conversation("u2", Some(&created.id), Mode::Chat)
            .unwrap();
        assert_ne!(other.id, created.id);
        assert_eq!(other.user_id, "u2");

        let unknown = store
            .get_or_create_conversation("u1", Some("missing"), Mode::Chat)
            .unwrap();
        assert_ne!(unknown.id, created.id);
    }

    #[test]
    fn test_add_message_persists_and_bumps_updated_at() {
        let (_dir, store) = store();
        let conversation = store.create_conversation("u1", Mode::Chat, None).unwrap();

        store
            .add_message(&conversation.id, Role::User, "hello")
            .unwrap();

        let messages = store.get_conversation_messages(&conversation.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].role, Role::User);

        let reloaded = store
            .get_or_create_conversation("u1", Some(&conversation.id), Mode::Chat)
            .unwrap();
        assert!(reloaded.updated_at >= conversation.updated_at);
    }

    #[test]
    fn test_structured_content_round_trips() {
        let (_dir, store) = store();
        let conversation = store.create_conversation("u1", Mode::Agent, None).unwrap();

        store
            .add_message(&conversation.id, Role::Assistant, json!({"files": 3}))
            .unwrap();
        store
            .add_message(&conversation.id, Role::User, "plain text")
            .unwrap();

        let messages = store.get_conversation_messages(&conversation.id).unwrap();
        assert_eq!(messages[0].structured(), Some(json!({"files": 3})));
        assert_eq!(messages[1].structured(), None);
    }

    #[test]
    fn test_title_derivation_truncates_at_fifty_chars() {
        let long = "x".repeat(60);
        let derived = derive_title(&long);
        assert_eq!(derived.chars().count(), 53);
        assert!(derived.ends_with("..."));

        assert_eq!(derive_title("short question"), "short question");

        let exact = "y".repeat(50);
        assert_eq!(derive_title(&exact), exact);
    }

    #[test]
    fn test_title_set_only_with_single_message() {
        let (_dir, store) = store();
        let conversation = store.create_conversation("u1", Mode::Chat, None).unwrap();

        store
            .add_message(&conversation.id, Role::User, "First question here")
            .unwrap();
        store
            .maybe_set_title(&conversation.id, "First question here")
            .unwrap();

        let titled = store
            .get_or_create_conversation("u1", Some(&conversation.id), Mode::Chat)
            .unwrap();
        assert_eq!(titled.title, "First question here");

        store
            .add_message(&conversation.id, Role::Assistant, "An answer")
            .unwrap();
        store
            .maybe_set_title(&conversation.id, "Different text")
            .unwrap();

        let unchanged = store
            .get_or_create_conversation("u1", Some(&conversation.id), Mode::Chat)
            .unwrap();
        assert_eq!(unchanged.title, "First question here");
    }

    #[test]
    fn test_list_sorted_by_recency_and_scoped_to_user() {
        let (_dir, store) = store();
        let first = store.create_conversation("u1", Mode::Chat, None).unwrap();
        let second = store.create_conversation("u1", Mode::Tool, None).unwrap();
        store.create_conversation("u2", Mode::Chat, None).unwrap();

        // Touch the first conversation so it becomes the most recent
        store.add_message(&first.id, Role::User, "bump").unwrap();

        let listed = store.get_user_conversations("u1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[test]
    fn test_delete_requires_matching_user() {
        let (_dir, store) = store();
        let conversation = store.create_conversation("u1", Mode::Chat, None).unwrap();

        assert!(!store.delete_conversation(&conversation.id, "u2").unwrap());
        assert!(store
            .get_or_create_conversation("u1", Some(&conversation.id), Mode::Chat)
            .map(|c| c.id == conversation.id)
            .unwrap());

        assert!(store.delete_conversation(&conversation.id, "u1").unwrap());
        assert!(!store.delete_conversation(&conversation.id, "u1").unwrap());
    }

    #[test]
    fn test_format_messages_for_model() {
        let now = Utc::now();
        let messages = vec![
            StoredMessage {
                id: "m1".to_string(),
                conversation_id: "c1".to_string(),
                role: Role::User,
                content: "question".to_string(),
                created_at: now,
            },
            StoredMessage {
                id: "m2".to_string(),
                conversation_id: "c1".to_string(),
                role: Role::Assistant,
                content: "answer".to_string(),
                created_at: now,
            },
        ];

        let formatted = format_messages_for_model(&messages);
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].role, Role::User);
        assert_eq!(formatted[0].text(), "question");
        assert_eq!(formatted[1].role, Role::Assistant);
        assert_eq!(formatted[1].text(), "answer");
    }
}
