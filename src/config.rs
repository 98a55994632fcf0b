//! Configuration management for TutorLink

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Language model used by every component
    pub provider: ProviderConfig,

    /// Intent routing thresholds
    pub intent: IntentConfig,

    /// Grounded answering over the lecture passage index
    pub retrieval: RetrievalConfig,

    /// Learning report generation
    pub report: ReportConfig,

    /// Session and component pool lifecycle
    pub sessions: SessionConfig,

    /// Quiz surface reachability
    pub quiz: QuizConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Where registered users and answer records are kept
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider kind: "openai" (any compatible API), "anthropic" or "ollama"
    pub kind: String,

    /// API endpoint URL
    pub endpoint: String,

    /// API key (can be env var reference like $DEEPSEEK_API_KEY)
    pub api_key: String,

    /// Model to use
    pub model: String,

    /// Max tokens for responses
    pub max_tokens: Option<u32>,

    /// Upper bound for a single completion call
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Keyword score at or above which the intent is accepted without a model call
    pub high_confidence: f64,

    /// Keyword score at or below which the model is asked to classify
    pub fallback_threshold: f64,

    /// Whether low-confidence inputs may be sent to the model at all
    pub llm_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSON file holding the prebuilt passage index
    pub index_path: PathBuf,

    /// Passages requested from the index per question
    pub top_k: usize,

    /// Minimum similarity for a passage to enter the context
    pub relevance_floor: f64,

    /// Characters kept from each passage
    pub passage_char_cap: usize,

    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Mismatch count at which a knowledge point counts as weak
    pub weak_threshold: usize,

    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for longer than this are released by the sweeper
    pub idle_timeout_secs: u64,

    /// How often the sweeper runs
    pub sweep_interval_secs: u64,

    /// Soft limit on cached per-user component sets
    pub pool_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    /// Port the quiz site listens on when reached by IP address
    pub port: u16,

    /// Landing page of the quiz site
    pub path: String,

    /// Host to advertise when the request carries none
    pub public_host: Option<String>,

    /// How long to wait for the quiz site to answer on loopback before giving up
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,

    /// Upper bound for handling one utterance end to end
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file for users and answer records; in-memory when unset
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            provider: ProviderConfig {
                kind: "openai".to_string(),
                endpoint: "https://api.deepseek.com/v1".to_string(),
                api_key: "$DEEPSEEK_API_KEY".to_string(),
                model: "deepseek-chat".to_string(),
                max_tokens: Some(2048),
                timeout_secs: 60,
            },
            intent: IntentConfig {
                high_confidence: 68.0,
                fallback_threshold: 55.0,
                llm_fallback: true,
            },
            retrieval: RetrievalConfig {
                index_path: data_dir.join("index").join("passages.json"),
                top_k: 5,
                relevance_floor: 0.5,
                passage_char_cap: 1200,
                temperature: 0.2,
            },
            report: ReportConfig {
                weak_threshold: 3,
                temperature: 0.3,
            },
            sessions: SessionConfig {
                idle_timeout_secs: 900,
                sweep_interval_secs: 180,
                pool_capacity: 64,
            },
            quiz: QuizConfig {
                port: 50012,
                path: "/dashboard".to_string(),
                public_host: None,
                ready_timeout_secs: 20,
            },
            server: ServerConfig {
                bind: "0.0.0.0:8010".to_string(),
                request_timeout_secs: 90,
            },
            store: StoreConfig {
                path: Some(data_dir.join("store.json")),
            },
        }
    }
}

impl Config {
    /// Load config from file or create default
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tutorlink")
            .join("config.toml")
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tutorlink")
    }

    /// Resolve API key from config (handles env var references)
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = &self.provider.api_key;
        if let Some(var) = key.strip_prefix('$') {
            std::env::var(var).ok().filter(|k| !k.is_empty())
        } else if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.sessions.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
