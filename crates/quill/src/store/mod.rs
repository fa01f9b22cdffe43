//! Local persistence for conversations

mod conversations;

pub use conversations::{
    format_messages_for_model, Conversation, ConversationStore, MessageContent, Mode,
    StoredMessage,
};
