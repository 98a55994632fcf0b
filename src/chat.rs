//! Plain conversation without lecture grounding

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::llm::LanguageModel;

const SYSTEM_PROMPT: &str = "You are a helpful study assistant.\nIf uncertain, say so and give possible directions.";

/// Turns of history sent with each message
pub const HISTORY_TURNS: usize = 8;

const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub struct ChatAssistant {
    llm: Arc<dyn LanguageModel>,
}

impl ChatAssistant {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Reply to `message` given earlier turns; only the last [`HISTORY_TURNS`] are sent
    pub async fn reply(&self, history: &[ChatTurn], message: &str) -> Result<String> {
        let prompt = render_prompt(history, message);
        self.llm.complete(SYSTEM_PROMPT, &prompt, TEMPERATURE).await
    }
}

fn render_prompt(history: &[ChatTurn], message: &str) -> String {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let mut prompt = String::new();
    for turn in &history[start..] {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{}: {}\n", speaker, turn.content));
    }
    prompt.push_str(&format!("User: {}\nAssistant:", message));
    prompt
}
