//! Tool-augmented chat mode
//!
//! The tool set is chosen once per session and carried as a value; nothing
//! about the selection outlives the session.

use std::io;

use anyhow::Result;
use console::style;
use dialoguer::MultiSelect;
use tracing::error;

use crate::llm::Role;
use crate::store::{format_messages_for_model, Mode};
use crate::tools::{ToolRegistry, ToolSelection};

use super::{confirm, init_conversation, prompt_input, stream_reply, Session};

pub async fn run_tool_session(session: &Session, conversation_id: Option<&str>) -> Result<()> {
    let Some(selection) = select_tools(&session.registry)? else {
        println!("{}", style("Tool selection cancelled.").yellow());
        return Ok(());
    };

    if selection.is_empty() {
        println!(
            "{}",
            style("No tools selected. Proceeding without tools.").yellow()
        );
    } else {
        println!(
            "{} {}",
            style("Enabled tools:").green().bold(),
            selection.names().join(", ")
        );
    }

    let conversation = init_conversation(session, conversation_id, Mode::Tool)?;

    println!(
        "{}",
        style("Type your message and press enter. Type 'exit' to end the session.").dim()
    );
    println!();

    loop {
        let Some(input) = prompt_input("Your message")? else {
            println!("{}", style("Chat session ended. Goodbye!").yellow());
            return Ok(());
        };

        session
            .store
            .add_message(&conversation.id, Role::User, input.as_str())?;
        session.store.maybe_set_title(&conversation.id, &input)?;

        let stored = session.store.get_conversation_messages(&conversation.id)?;
        let history = format_messages_for_model(&stored);

        match stream_reply(session, history, selection.clone()).await {
            Ok(outcome) => {
                session.store.add_message(
                    &conversation.id,
                    Role::Assistant,
                    outcome.content.as_str(),
                )?;
            }
            Err(e) => {
                error!("Tool chat turn failed: {e:#}");
                eprintln!("{}", style(format!("Error: {e:#}")).red());
                session.store.add_message(
                    &conversation.id,
                    Role::Assistant,
                    format!("Error: {e}"),
                )?;
                if !confirm("Do you want to try again?", true)? {
                    return Ok(());
                }
            }
        }
    }
}

/// Multi-select over the registry's tools. Returns None when cancelled.
fn select_tools(registry: &ToolRegistry) -> Result<Option<ToolSelection>> {
    let names = registry.names();
    let chosen = MultiSelect::new()
        .with_prompt("Select tools for this session (space to toggle, enter to confirm)")
        .items(&names)
        .interact();
    match chosen {
        Ok(indexes) => Ok(Some(ToolSelection::from_names(
            indexes
                .into_iter()
                .map(|index| names[index].to_string())
                .collect(),
        ))),
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}
