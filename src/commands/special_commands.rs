//! Special commands parser for the interactive chat
//!
//! Commands are prefixed with `/`; the command word is case-insensitive,
//! arguments (agent ids, file names) are kept as typed. `exit` and `quit`
//! also work without the slash.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
///
/// These commands act on the session instead of being sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Reset the conversation and talk to another agent
    SwitchAgent(String),

    /// Set (`Some`) or clear (`None`) the reference document
    SetReference(Option<String>),

    /// Submit a turn with no text (asks the agent to build topics)
    Build,

    /// Close the choice list; the selection stays pending
    Skip,

    /// Show the pending choice list again
    Choices,

    /// Print the conversation so far
    History,

    /// List available agents
    Agents,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    None,
}

/// Parse a line of chat input into a [`SpecialCommand`]
///
/// # Examples
///
/// ```
/// use agentdesk::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(
///     parse_special_command("/agent comicsAgent").unwrap(),
///     SpecialCommand::SwitchAgent("comicsAgent".to_string())
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" => SpecialCommand::Exit,
            _ => SpecialCommand::None,
        });
    }

    let (word, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((word, arg)) => (word.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match word.as_str() {
        "/agent" => {
            if arg.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/agent".to_string(),
                    usage: "/agent <id>".to_string(),
                })
            } else {
                Ok(SpecialCommand::SwitchAgent(arg.to_string()))
            }
        }
        "/srt" => {
            if arg.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/srt".to_string(),
                    usage: "/srt <file name> | /srt none".to_string(),
                })
            } else if arg.eq_ignore_ascii_case("none") {
                Ok(SpecialCommand::SetReference(None))
            } else {
                Ok(SpecialCommand::SetReference(Some(arg.to_string())))
            }
        }
        "/build" => Ok(SpecialCommand::Build),
        "/skip" => Ok(SpecialCommand::Skip),
        "/choices" => Ok(SpecialCommand::Choices),
        "/history" => Ok(SpecialCommand::History),
        "/agents" => Ok(SpecialCommand::Agents),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help for the interactive chat
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

AGENTS:
  /agent <id>     - Start over with another agent
  /agents         - List available agents

REFERENCE DOCUMENT:
  /srt <file>     - Send this subtitle file with each turn
  /srt none       - Stop sending a subtitle file

TURNS:
  <text>          - Send a message to the agent
  /build          - Send an empty turn (build topics from the document)
  Ctrl-C          - Cancel the turn in progress

CHOICES:
  <number>        - Pick a choice from the list
  <text>          - Answer the pending choice with your own text
  /skip           - Hide the list (the agent keeps waiting)
  /choices        - Show the list again

SESSION:
  /history        - Print the conversation
  /help           - Show this help
  /exit, /quit    - Leave the chat
"#
    );
}
