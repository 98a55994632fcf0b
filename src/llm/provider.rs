//! LLM Provider implementations

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{Result, TutorError};

/// Chat-completion style language model
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
    fn name(&self) -> &str;
}

fn http_client(config: &ProviderConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Resolve a base URL to a full endpoint, tolerating trailing path segments.
fn join_endpoint(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with(suffix) {
        base.to_string()
    } else {
        format!("{}{}", base, suffix)
    }
}

/// Ollama provider (local)
pub struct OllamaProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessageResponse,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(&config)?,
            config,
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for OllamaProvider {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = OllamaRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
            options: OllamaOptions { temperature },
        };

        let url = join_endpoint(&self.config.endpoint, "/api/chat");
        let response: OllamaResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.message.content)
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}

/// OpenAI-compatible provider (DeepSeek, Moonshot, OpenAI)
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(&config)?,
            config,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature,
        };

        let url = join_endpoint(&self.config.endpoint, "/chat/completions");
        let response: OpenAiResponse = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TutorError::Provider("No response from OpenAI-compatible API".to_string()))
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(&config)?,
            config,
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for AnthropicProvider {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens.unwrap_or(4096),
            system,
            temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
        };

        let url = join_endpoint(&self.config.endpoint, "/messages");
        let response: AnthropicResponse = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| TutorError::Provider("No response from Anthropic".to_string()))
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}

/// Factory function to create provider from config
pub fn create_provider(
    config: ProviderConfig,
    api_key: Option<String>,
) -> Result<Box<dyn LanguageModel>> {
    match config.kind.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "openai" => {
            let key = api_key.ok_or_else(|| TutorError::MissingApiKey("openai".to_string()))?;
            Ok(Box::new(OpenAiProvider::new(config, key)?))
        }
        "anthropic" => {
            let key = api_key.ok_or_else(|| TutorError::MissingApiKey("anthropic".to_string()))?;
            Ok(Box::new(AnthropicProvider::new(config, key)?))
        }
        other => Err(TutorError::Config(format!("Unknown provider: {}", other))),
    }
}
