//! Plain chat mode

use anyhow::Result;
use console::style;
use tracing::error;

use crate::llm::Role;
use crate::store::{format_messages_for_model, Mode};
use crate::tools::ToolSelection;

use super::{confirm, init_conversation, prompt_input, stream_reply, Session};

pub async fn run_chat_session(session: &Session, conversation_id: Option<&str>) -> Result<()> {
    let conversation = init_conversation(session, conversation_id, Mode::Chat)?;

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

        match stream_reply(session, history, ToolSelection::none()).await {
            Ok(outcome) => {
                session.store.add_message(
                    &conversation.id,
                    Role::Assistant,
                    outcome.content.as_str(),
                )?;
            }
            Err(e) => {
                error!("Chat turn failed: {e:#}");
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
