//! Configuration management for AgentDesk
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AgentDeskError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for AgentDesk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoints
    #[serde(default)]
    pub server: ServerConfig,
    /// Chat session behavior
    #[serde(default)]
    pub chat: ChatConfig,
    /// Reference-document settings
    #[serde(default)]
    pub documents: DocumentsConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the streaming agent server
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Base URL of the REST API (documents, conversations, health)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for REST requests (seconds)
    ///
    /// Streaming runs are only bounded while connecting; an exchange may
    /// stream for as long as the backend keeps it open.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_stream_url() -> String {
    "http://localhost:2024".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            api_url: default_api_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// REST request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Chat session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Agent used when `chat` is started without `--agent`
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// Print activity events while an agent works
    #[serde(default = "default_show_activity")]
    pub show_activity: bool,
}

fn default_agent() -> String {
    crate::session::strategy::CONTENT_AGENT.to_string()
}

fn default_show_activity() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
            show_activity: default_show_activity(),
        }
    }
}

/// Reference-document configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// File extension the backend accepts for uploads, without the dot
    #[serde(default = "default_accepted_extension")]
    pub accepted_extension: String,
}

fn default_accepted_extension() -> String {
    "srt".to_string()
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            accepted_extension: default_accepted_extension(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentDeskError::Configuration(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            AgentDeskError::Configuration(format!("Failed to parse config: {}", e)).into()
        })
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("AGENTDESK_STREAM_URL") {
            self.server.stream_url = url;
        }

        if let Ok(url) = std::env::var("AGENTDESK_API_URL") {
            self.server.api_url = url;
        }

        if let Ok(timeout) = std::env::var("AGENTDESK_REQUEST_TIMEOUT") {
            if let Ok(value) = timeout.parse() {
                self.server.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AGENTDESK_REQUEST_TIMEOUT: {}", timeout);
            }
        }

        if let Ok(agent) = std::env::var("AGENTDESK_DEFAULT_AGENT") {
            self.chat.default_agent = agent;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let crate::cli::Commands::Chat {
            agent: Some(agent), ..
        } = &cli.command
        {
            self.chat.default_agent = agent.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`AgentDeskError::Configuration`] if a URL does not parse,
    /// the timeout is zero, or the agent or extension is empty
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("server.stream_url", &self.server.stream_url),
            ("server.api_url", &self.server.api_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(AgentDeskError::Configuration(format!(
                    "{} is not a valid URL ({}): {}",
                    name, value, e
                ))
                .into());
            }
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(AgentDeskError::Configuration(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.default_agent.trim().is_empty() {
            return Err(AgentDeskError::Configuration(
                "chat.default_agent cannot be empty".to_string(),
            )
            .into());
        }

        if self
            .documents
            .accepted_extension
            .trim_start_matches('.')
            .is_empty()
        {
            return Err(AgentDeskError::Configuration(
                "documents.accepted_extension cannot be empty".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
