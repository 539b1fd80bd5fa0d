/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`          - Interactive chat session with one agent
- `agents`        - Print the agent catalogue
- `docs`          - Reference-document listing and upload
- `conversations` - Saved-conversation lookup
- `health`        - Backend health check

The handlers are thin: sessions, channels and REST calls live in the
library modules.
*/

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::Result;

// Special commands parser for the chat REPL
pub mod special_commands;

/// Builds the REST client described by `config`.
fn api_client(config: &Config) -> Result<ApiClient> {
    Ok(
        ApiClient::new(&config.server.api_url, config.server.request_timeout())?
            .with_accepted_extension(config.documents.accepted_extension.clone()),
    )
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Opens an HTTP streaming channel, creates a session for the chosen
    //! agent and runs a readline loop. Each turn is pumped until its
    //! exchange closes; Ctrl-C while streaming cancels the turn.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::channel::http::HttpStreamChannel;
    use crate::channel::{ChannelEvent, StreamingChannel};
    use crate::session::activity::ActivityView;
    use crate::session::handshake::SelectionRequest;
    use crate::session::pump::{pump_exchange, share, PumpExit, SharedSession};
    use crate::session::strategy::UserInput;
    use crate::session::view::EntryBody;
    use crate::session::{ConversationSession, EventOutcome};
    use colored::Colorize;
    use futures::Stream;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Start an interactive chat session
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration; `chat.default_agent` selects the agent
    /// * `srt` - Reference document to send with each turn
    pub async fn run_chat(config: Config, srt: Option<String>) -> Result<()> {
        let agent = config.chat.default_agent.clone();
        tracing::info!("Starting chat with {}", agent);
        if crate::agents::find(&agent).is_none() {
            tracing::warn!("{} is not in the agent catalogue", agent);
        }

        let channel = Arc::new(HttpStreamChannel::new(
            &config.server.stream_url,
            config.server.request_timeout(),
        )?);
        let session = share(ConversationSession::new(agent.clone(), channel.clone()));
        let mut events = channel.events();
        let mut reference = srt;

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&agent, reference.as_deref());

        loop {
            let prompt = {
                let guard = session.lock().await;
                if let Some(request) = guard.pending_selection() {
                    if !request.dismissed {
                        print!("{}", format_choices(request));
                    }
                }
                format_prompt(guard.agent_id(), guard.phase().name())
            };

            let line = match rl.readline(&prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            rl.add_history_entry(trimmed)?;

            let command = match parse_special_command(trimmed) {
                Ok(command) => command,
                Err(e) => {
                    eprintln!("{}", e.to_string().red());
                    continue;
                }
            };

            let started = match command {
                SpecialCommand::Exit => break,
                SpecialCommand::Help => {
                    print_help();
                    continue;
                }
                SpecialCommand::Agents => {
                    super::agents::print_catalogue();
                    continue;
                }
                SpecialCommand::History => {
                    print_history(&*session.lock().await);
                    continue;
                }
                SpecialCommand::SwitchAgent(id) => {
                    if crate::agents::find(&id).is_none() {
                        println!("{}", format!("'{}' is not a known agent", id).yellow());
                    }
                    session.lock().await.switch_agent(id.clone()).await;
                    println!("Now talking to {}; conversation cleared\n", id.cyan());
                    continue;
                }
                SpecialCommand::SetReference(doc) => {
                    match &doc {
                        Some(name) => println!("Reference document: {}", name.cyan()),
                        None => println!("Reference document cleared"),
                    }
                    reference = doc;
                    continue;
                }
                SpecialCommand::Skip => {
                    report(session.lock().await.dismiss_selection());
                    continue;
                }
                SpecialCommand::Choices => {
                    report(session.lock().await.reopen_selection());
                    continue;
                }
                SpecialCommand::Build => {
                    submit_turn(&session, UserInput::text(""), reference.as_deref()).await
                }
                SpecialCommand::None => {
                    let pending = session.lock().await.pending_selection().cloned();
                    match pending {
                        Some(request) => {
                            let choice = resolve_choice_input(&request, trimmed);
                            session.lock().await.resolve_selection(&choice).await
                        }
                        None => {
                            submit_turn(&session, UserInput::text(trimmed), reference.as_deref())
                                .await
                        }
                    }
                }
            };

            match started {
                Ok(_) => stream_turn(&session, &mut events, config.chat.show_activity).await,
                Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    async fn submit_turn(
        session: &SharedSession,
        input: UserInput,
        reference: Option<&str>,
    ) -> Result<crate::channel::ExchangeId> {
        let input = match reference {
            Some(doc) => input.with_srt(doc),
            None => input,
        };
        session.lock().await.submit(input).await
    }

    /// Pumps the open exchange, printing as it streams.
    async fn stream_turn<S>(session: &SharedSession, events: &mut S, show_activity: bool)
    where
        S: Stream<Item = ChannelEvent> + Unpin,
    {
        let cancellation = CancellationToken::new();
        let ctrl_c = {
            let token = cancellation.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            })
        };

        let exit = pump_exchange(session, events, &cancellation, |outcome| {
            print_outcome(outcome, show_activity)
        })
        .await;
        ctrl_c.abort();

        println!();
        match exit {
            PumpExit::Cancelled => println!("{}", "Turn cancelled".yellow()),
            PumpExit::ChannelClosed => eprintln!("{}", "Connection to the agent closed".red()),
            PumpExit::ExchangeClosed => {}
        }
    }

    fn print_outcome(outcome: &EventOutcome, show_activity: bool) {
        match outcome {
            EventOutcome::MessageDelta { delta, .. } => {
                print!("{}", delta.as_text());
                let _ = std::io::stdout().flush();
            }
            EventOutcome::Update {
                activity: Some(event),
                ..
            } if show_activity => {
                println!("\n{}", format!("  * {}", event.title).dimmed());
            }
            EventOutcome::Failed(message) => {
                eprintln!("\n{}", format!("Error: {}", message).red());
            }
            _ => {}
        }
    }

    fn report(result: Result<()>) {
        if let Err(e) = result {
            eprintln!("{}", e.to_string().yellow());
        }
    }

    /// Maps a 1-based menu number to its choice; anything else is taken verbatim.
    pub fn resolve_choice_input(request: &SelectionRequest, input: &str) -> String {
        input
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| request.choice_at(index))
            .map(str::to_string)
            .unwrap_or_else(|| input.trim().to_string())
    }

    /// Renders a pending choice list.
    pub fn format_choices(request: &SelectionRequest) -> String {
        let mut out = String::from("\nPick one (number or your own text, /skip to hide):\n");
        for (index, choice) in request.choices.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", index + 1, choice));
        }
        out
    }

    fn format_prompt(agent: &str, phase: &str) -> String {
        if phase == "awaiting-selection" {
            format!("[{}|{}] >> ", agent, "choose".green())
        } else {
            format!("[{}] >> ", agent)
        }
    }

    fn print_history(session: &ConversationSession) {
        for entry in session.transcript() {
            let who = match entry.message.role {
                crate::session::message::Role::Human => "you".bold(),
                crate::session::message::Role::Agent => session.agent_id().cyan().bold(),
            };
            match &entry.body {
                EntryBody::Markdown(text) => println!("{}: {}", who, text),
                EntryBody::Choices(choices) => {
                    println!("{}: (choices)", who);
                    for (index, choice) in choices.iter().enumerate() {
                        println!("    {}. {}", index + 1, choice);
                    }
                }
            }
            if let ActivityView::Historical(events) | ActivityView::Live(events) = entry.activity {
                for event in events {
                    println!("{}", format!("    * {}", event.title).dimmed());
                }
            }
        }
        println!();
    }

    fn print_welcome_banner(agent: &str, reference: Option<&str>) {
        println!("{}", "AgentDesk chat".bold());
        println!("Agent:     {}", agent.cyan());
        println!(
            "Reference: {}",
            reference.unwrap_or("(none, set with /srt <file>)")
        );
        println!("Type /help for commands, /exit to leave.\n");
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::session::handshake::SelectionSource;

        fn request(choices: &[&str]) -> SelectionRequest {
            SelectionRequest {
                choices: choices.iter().map(|c| c.to_string()).collect(),
                resume_context: None,
                source: SelectionSource::TopicsUpdate,
                dismissed: false,
            }
        }

        #[test]
        fn test_resolve_choice_input_by_number() {
            let req = request(&["Spring looks", "Desk setup"]);
            assert_eq!(resolve_choice_input(&req, "2"), "Desk setup");
            assert_eq!(resolve_choice_input(&req, " 1 "), "Spring looks");
        }

        #[test]
        fn test_resolve_choice_input_out_of_range_is_text() {
            let req = request(&["A"]);
            assert_eq!(resolve_choice_input(&req, "7"), "7");
            assert_eq!(resolve_choice_input(&req, "my own idea"), "my own idea");
        }

        #[test]
        fn test_format_choices_numbers_from_one() {
            let text = format_choices(&request(&["A", "B"]));
            assert!(text.contains("  1. A\n"));
            assert!(text.contains("  2. B\n"));
        }
    }
}

// Agent catalogue command handler
pub mod agents {
    //! Prints the built-in agent catalogue.

    use crate::agents::CATALOGUE;
    use crate::session::strategy::StrategyRegistry;
    use colored::Colorize;

    /// Print every catalogued agent
    pub fn print_catalogue() {
        let registry = StrategyRegistry::with_builtin();
        for agent in CATALOGUE {
            let stars = "*".repeat(agent.rating as usize);
            println!("{} {} ({})", agent.id.cyan().bold(), agent.name, agent.category);
            println!("    {}", agent.description);
            println!("    tags: {}  rating: {}", agent.tags.join(", "), stars);
            if !registry.contains(agent.id) {
                println!("    {}", "chat not supported yet".yellow());
            }
        }
    }
}

// Reference-document command handlers
pub mod docs {
    //! `docs list` and `docs upload`.

    use super::*;
    use colored::Colorize;
    use std::path::Path;

    /// Print the documents known to the backend
    pub async fn list_documents(config: &Config) -> Result<()> {
        let documents = api_client(config)?.list_documents().await?;
        if documents.is_empty() {
            println!("No reference documents uploaded yet");
            return Ok(());
        }
        for doc in documents {
            match doc.path {
                Some(path) => println!("{}  {}", doc.filename.cyan(), path.dimmed()),
                None => println!("{}", doc.filename.cyan()),
            }
        }
        Ok(())
    }

    /// Upload a subtitle file
    pub async fn upload_document(config: &Config, path: &Path) -> Result<()> {
        let receipt = api_client(config)?.upload_document(path).await?;
        if receipt.accepted {
            println!("Uploaded {}", receipt.filename.green());
        } else {
            println!("{}", format!("{} was not accepted", receipt.filename).yellow());
        }
        Ok(())
    }
}

// Saved-conversation command handlers
pub mod conversations {
    //! `conversations list|show|delete`.

    use super::*;
    use colored::Colorize;

    /// Print saved conversations
    pub async fn list_conversations(config: &Config) -> Result<()> {
        let conversations = api_client(config)?.list_conversations().await?;
        if conversations.is_empty() {
            println!("No saved conversations");
        }
        for conversation in conversations {
            println!(
                "{}  {} ({} bytes)",
                conversation.id.cyan(),
                conversation.filename,
                conversation.size
            );
        }
        Ok(())
    }

    /// Print one conversation as pretty JSON
    pub async fn show_conversation(config: &Config, id: &str) -> Result<()> {
        let conversation = api_client(config)?.get_conversation(id).await?;
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        Ok(())
    }

    /// Delete a conversation
    pub async fn delete_conversation(config: &Config, id: &str) -> Result<()> {
        api_client(config)?.delete_conversation(id).await?;
        println!("Deleted {}", id.green());
        Ok(())
    }
}

// Health command handler
pub mod health {
    //! Backend health check; reports, never fails on an unreachable backend.

    use super::*;
    use colored::Colorize;

    /// Check the backend and print the result
    ///
    /// Returns whether the backend is healthy.
    pub async fn check_health(config: &Config) -> Result<bool> {
        let healthy = api_client(config)?.health_check().await;
        if healthy {
            println!("{} {}", config.server.api_url, "ok".green());
        } else {
            println!("{} {}", config.server.api_url, "unreachable".red());
        }
        Ok(healthy)
    }

}
