//! AgentDesk - conversational front end for streaming content agents
//!
//! This library provides the client-side orchestration for chatting with
//! backend agents over a streaming channel: the session state machine,
//! per-agent submission strategies, activity aggregation and the topic
//! selection handshake.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session state machine, strategies, activity and selection handshake
//! - `channel`: Streaming channel abstraction and the HTTP/SSE implementation
//! - `api`: REST client for reference documents, conversations and health
//! - `agents`: Built-in agent catalogue
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentdesk::channel::fake::FakeChannel;
//! use agentdesk::session::strategy::UserInput;
//! use agentdesk::ConversationSession;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let channel = Arc::new(FakeChannel::new());
//!     let mut session = ConversationSession::new("contentAgent", channel);
//!     session.submit(UserInput::text("Write about spring")).await?;
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod api;
pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{AgentDeskError, Result};
pub use session::ConversationSession;
