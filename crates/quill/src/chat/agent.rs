//! Agent mode: generate a full application from a description
//!
//! Replaces the chat call with one structured-generation pass through the
//! scaffolder, then materializes the plan under the working directory.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use tracing::error;

use crate::llm::Role;
use crate::scaffold;
use crate::store::Mode;

use super::{confirm, init_conversation, thinking_spinner, Session};

pub async fn run_agent_session(session: &Session, conversation_id: Option<&str>) -> Result<()> {
    println!(
        "{}",
        style("The agent generates a complete application from your description.").cyan()
    );
    println!(
        "{}",
        style("Describe what to build; type 'exit' to end the session.").dim()
    );
    println!();

    if !confirm(
        "The agent will create files and folders in the current directory. Continue?",
        true,
    )? {
        println!("{}", style("Agent mode cancelled.").yellow());
        return Ok(());
    }

    let cwd = std::env::current_dir().context("Failed to resolve the current directory")?;
    let conversation = init_conversation(session, conversation_id, Mode::Agent)?;
    println!(
        "  {}",
        style(format!("Working directory: {}", cwd.display())).dim()
    );
    println!();

    loop {
        let Some(description) = prompt_description()? else {
            println!("{}", style("Agent session ended. Goodbye!").yellow());
            return Ok(());
        };

        session
            .store
            .add_message(&conversation.id, Role::User, description.as_str())?;
        session
            .store
            .maybe_set_title(&conversation.id, &description)?;

        match generate_and_materialize(session, &description, &cwd).await {
            Ok(summary) => {
                session
                    .store
                    .add_message(&conversation.id, Role::Assistant, summary.as_str())?;
                if !confirm("Would you like to generate another application?", false)? {
                    println!("{}", style("Check your generated application!").green());
                    return Ok(());
                }
            }
            Err(e) => {
                error!("Application generation failed: {e:#}");
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

/// Description prompt with a 10-character minimum. Returns None on Ctrl-C or
/// the `exit` sentinel.
fn prompt_description() -> Result<Option<String>> {
    let input = Input::<String>::new()
        .with_prompt("What would you like the agent to create?")
        .validate_with(|value: &String| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err("Please enter a description.")
            } else if trimmed.eq_ignore_ascii_case("exit") {
                Ok(())
            } else if trimmed.len() < 10 {
                Err("Description is too short. Please provide more details.")
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

/// Generate a plan, show the prospective tree, write the files, and return
/// the summary message persisted to the conversation.
async fn generate_and_materialize(
    session: &Session,
    description: &str,
    cwd: &Path,
) -> Result<String> {
    let spinner = thinking_spinner("Generating application...");
    let plan = scaffold::generate_plan(&session.client, description).await;
    spinner.finish_and_clear();
    let plan = plan?;

    println!();
    println!("{} {}", style("Folder:").bold(), plan.folder_name);
    println!("{} {}", style("Description:").bold(), plan.description);
    println!();
    println!("{}", style("Generated application structure:").green());
    print!("{}", scaffold::render_file_tree(&plan));
    println!();

    let app_dir = scaffold::materialize(&plan, cwd)?;
    println!(
        "{}",
        style(format!(
            "Application files created in {}",
            app_dir.display()
        ))
        .green()
    );

    if !plan.setup_commands.is_empty() {
        println!();
        println!("{}", style("Setup commands:").yellow().bold());
        for (index, command) in plan.setup_commands.iter().enumerate() {
            println!("  {}. {command}", index + 1);
        }
    }
    println!();

    Ok(format!(
        "Application \"{}\" generated successfully in folder \"{}\".\nFiles created: {}\nSetup Commands:\n{}",
        plan.folder_name,
        plan.folder_name,
        plan.files.len(),
        plan.setup_commands.join("\n")
    ))
}
