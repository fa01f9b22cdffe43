//! Interactive chat sessions
//!
//! Three session flavors share one loop shape: prompt, persist the user
//! message, stream the reply, persist the assistant message. Errors persist
//! an error-noting message and offer a retry instead of ending the session.

mod agent;
mod plain;
mod tools;

pub use agent::run_agent_session;
pub use plain::run_chat_session;
pub use tools::run_tool_session;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};

use crate::auth::UserInfo;
use crate::config::Config;
use crate::llm::{self, ChatEvent, ChatOutcome, Message, ModelClient, Role};
use crate::store::{Conversation, ConversationStore, Mode, StoredMessage};
use crate::tools::{ToolRegistry, ToolSelection};

/// Everything a chat session needs: model access, tools, persistence, and
/// the authenticated user.
pub struct Session {
    pub(crate) client: Arc<ModelClient>,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) store: ConversationStore,
    pub(crate) config: Config,
    pub(crate) user: UserInfo,
}

impl Session {
    pub fn new(config: Config, user: UserInfo, api_key: String) -> Result<Self> {
        let client = Arc::new(ModelClient::new(&config.model, api_key)?);
        Ok(Self {
            client,
            registry: Arc::new(ToolRegistry::new()),
            store: ConversationStore::new()?,
            config,
            user,
        })
    }
}

/// Resolve or create the conversation, print the session banner, and replay
/// prior messages when resuming.
pub(crate) fn init_conversation(
    session: &Session,
    conversation_id: Option<&str>,
    mode: Mode,
) -> Result<Conversation> {
    let conversation =
        session
            .store
            .get_or_create_conversation(&session.user.id, conversation_id, mode)?;

    println!();
    println!(
        "{} {}",
        style("Conversation:").cyan().bold(),
        conversation.title
    );
    println!("  {}", style(format!("ID: {}", conversation.id)).dim());
    println!("  {}", style(format!("Mode: {}", conversation.mode)).dim());
    println!();

    replay_messages(&conversation.messages);
    Ok(conversation)
}

fn replay_messages(messages: &[StoredMessage]) {
    if messages.is_empty() {
        return;
    }
    println!("{}", style("Previous messages").yellow());
    println!();
    for message in messages {
        match message.role {
            Role::User => println!("{} {}", style("You:").blue().bold(), message.content),
            Role::Assistant => {
                println!(
                    "{} {}",
                    style("Assistant:").green().bold(),
                    message.content
                )
            }
        }
        println!();
    }
}

/// Prompt for a chat message. Returns None on Ctrl-C or the `exit` sentinel.
pub(crate) fn prompt_input(prompt: &str) -> Result<Option<String>> {
    let input = Input::<String>::new()
        .with_prompt(prompt)
        .validate_with(|value: &String| {
            if value.trim().is_empty() {
                Err("Message cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text();
    match input {
        Ok(value) => {
            let value = value.trim().to_string();
            if value.eq_ignore_ascii_case("exit") {
                Ok(None)
            } else {
                Ok(Some(value))
            }
        }
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Yes/no prompt. Ctrl-C counts as "no".
pub(crate) fn confirm(prompt: &str, default: bool) -> Result<bool> {
    match Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
    {
        Ok(choice) => Ok(choice),
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn thinking_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// Run one model turn over `history`, rendering events as they stream.
/// The spinner runs until the first event arrives.
pub(crate) async fn stream_reply(
    session: &Session,
    history: Vec<Message>,
    selection: ToolSelection,
) -> Result<ChatOutcome> {
    let display_limit = session.config.chat.tool_result_display_limit;
    let spinner = thinking_spinner("Waiting for the model...");
    let mut first_output = true;

    let mut stream = llm::send_message(
        session.client.clone(),
        session.registry.clone(),
        selection,
        None,
        history,
        llm::MAX_TOOL_STEPS,
    );

    while let Some(event) = stream.next_event().await {
        if first_output {
            spinner.finish_and_clear();
            println!();
            println!("{}", style("Assistant:").green().bold());
            println!("{}", style("-".repeat(60)).dim());
            first_output = false;
        }
        match event {
            ChatEvent::TextDelta(text) => {
                print!("{text}");
                let _ = io::stdout().flush();
            }
            ChatEvent::ToolCall(call) => {
                println!();
                println!(
                    "{} {} {}",
                    style("Tool call:").cyan().bold(),
                    call.name,
                    style(call.arguments.to_string()).dim()
                );
            }
            ChatEvent::ToolResult(result) => {
                let label = if result.is_error {
                    style("Tool error:").red().bold()
                } else {
                    style("Tool result:").green().bold()
                };
                println!(
                    "{} {} {}",
                    label,
                    result.name,
                    style(display_excerpt(&result.content, display_limit)).dim()
                );
            }
        }
    }

    let outcome = stream.finish().await;
    if first_output {
        spinner.finish_and_clear();
    }
    let outcome = outcome?;
    if !first_output {
        println!();
        println!("{}", style("-".repeat(60)).dim());
    }
    Ok(outcome)
}

/// First `max_chars` characters, with an ellipsis when the text was longer
pub(crate) fn display_excerpt(text: &str, max_chars: usize) -> String {
    let mut excerpt: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_excerpt_truncates_on_char_boundary() {
        assert_eq!(display_excerpt("short", 200), "short");

        let long = "é".repeat(250);
        let shown = display_excerpt(&long, 200);
        assert_eq!(shown.chars().count(), 203);
        assert!(shown.ends_with("..."));

        let exact = "a".repeat(200);
        assert_eq!(display_excerpt(&exact, 200), exact);
    }
}
