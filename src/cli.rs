//! Command-line interface definition for AgentDesk
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting with agents, managing reference
//! documents and browsing saved conversations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AgentDesk - drive streaming content agents from the terminal
///
/// Chat with an agent, pick generated topics when it asks, and manage the
/// subtitle files agents work from.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentdesk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/agentdesk.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for AgentDesk
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session with an agent
    Chat {
        /// Agent to talk to (overrides chat.default_agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Reference document (subtitle file name) to send with each turn
        #[arg(short, long)]
        srt: Option<String>,
    },

    /// List the built-in agents
    Agents,

    /// Manage reference documents
    Docs {
        /// Document subcommand
        #[command(subcommand)]
        command: DocsCommand,
    },

    /// Browse saved conversations
    Conversations {
        /// Conversation subcommand
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Check whether the backend is reachable
    Health,
}

/// Reference-document subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DocsCommand {
    /// List documents known to the backend
    List,

    /// Upload a subtitle file
    Upload {
        /// Path of the file to upload
        path: PathBuf,
    },
}

/// Saved-conversation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConversationCommand {
    /// List saved conversations
    List,

    /// Print one conversation as JSON
    Show {
        /// Conversation id
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
