//! Error types for TutorLink

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Failed to build components for {user}: {reason}")]
    ComponentInit { user: String, reason: String },

    #[error("Passage index error: {0}")]
    Index(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session {0} is closed")]
    SessionClosed(String),
}

pub type Result<T> = std::result::Result<T, TutorError>;
