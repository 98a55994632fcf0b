//! Intent routing - decides what a learner's utterance is asking for
//!
//! Confident keyword matches are resolved locally. Inputs that look like
//! nothing in particular are handed to the language model for a one-word
//! label, and anything in between defaults to normal chat.

mod fuzzy;
mod keywords;

pub use fuzzy::{partial_ratio, ratio};
pub use keywords::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::IntentConfig;
use crate::llm::LanguageModel;

const VERB_BONUS: f64 = 6.0;
const VERB_BONUS_CAP: f64 = 18.0;
/// Verbs only reinforce a phrase that already matched this well
const VERB_GATE: f64 = 80.0;
/// Phrases shorter than this match as word stems, not fuzzily
const SHORT_PHRASE: usize = 6;
const LENGTH_PENALTY: f64 = 5.0;
const MIN_LENGTH: usize = 4;
const MAX_LENGTH: usize = 120;

/// What the learner wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// A weak-area analysis built from the learner's wrong answers
    LearningReport,
    /// Open the quiz site
    Quiz,
    /// Anything else, answered from the lecture material
    NormalChat,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::LearningReport, Intent::Quiz, Intent::NormalChat];

    pub fn label(&self) -> &'static str {
        match self {
            Intent::LearningReport => "LEARNING_REPORT",
            Intent::Quiz => "QUIZ",
            Intent::NormalChat => "NORMAL_CHAT",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.label() == s)
            .ok_or_else(|| format!("unknown intent label: {}", s))
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// Keyword score cleared the high-confidence threshold
    Keyword,
    /// The language model picked the label
    Model,
    /// Neither path produced a label
    Default,
}

#[derive(Debug, Clone)]
pub struct IntentAnalysis {
    pub intent: Intent,
    /// Best keyword score in [0, 100]
    pub score: f64,
    pub source: ClassificationSource,
}

/// Maps free-form text to an [`Intent`]. Never fails.
pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    config: IntentConfig,
    triggers: Vec<IntentTriggers>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, config: IntentConfig, timeout: Duration) -> Self {
        Self {
            llm,
            config,
            triggers: default_triggers(),
            timeout,
        }
    }

    pub fn triggers(&self) -> &[IntentTriggers] {
        &self.triggers
    }

    pub async fn classify(&self, text: &str) -> Intent {
        self.analyze(text).await.intent
    }

    pub async fn analyze(&self, text: &str) -> IntentAnalysis {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return IntentAnalysis {
                intent: Intent::NormalChat,
                score: 0.0,
                source: ClassificationSource::Default,
            };
        }

        let (best, score) = self.best_keyword_match(&normalized);
        debug!(intent = %best, score, "keyword score");

        if score >= self.config.high_confidence {
            return IntentAnalysis {
                intent: best,
                score,
                source: ClassificationSource::Keyword,
            };
        }

        if self.config.llm_fallback && score <= self.config.fallback_threshold {
            if let Some(intent) = self.model_fallback(text.trim()).await {
                return IntentAnalysis {
                    intent,
                    score,
                    source: ClassificationSource::Model,
                };
            }
        }

        IntentAnalysis {
            intent: Intent::NormalChat,
            score,
            source: ClassificationSource::Default,
        }
    }

    /// Highest scoring keyword intent for already-normalized text.
    /// Ties keep the earlier trigger table.
    pub fn best_keyword_match(&self, normalized: &str) -> (Intent, f64) {
        let mut best = (Intent::NormalChat, 0.0);
        for triggers in &self.triggers {
            let score = score_triggers(normalized, triggers);
            if score > best.1 {
                best = (triggers.intent, score);
            }
        }
        best
    }

    async fn model_fallback(&self, text: &str) -> Option<Intent> {
        let user = format!(
            "Classify the user query into exactly one of: LEARNING_REPORT, QUIZ, NORMAL_CHAT.\n\
             - LEARNING_REPORT if asking for a learning/study report, summary or review of their progress.\n\
             - QUIZ if asking to take a quiz, test or practice exercises.\n\
             - Otherwise NORMAL_CHAT. Output only the label.\n\n\
             User input: {}\n\
             Label:",
            text
        );

        let call = self.llm.complete("You are an intent classifier.", &user, 0.0);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => {
                let parsed = parse_label(&raw);
                if parsed.is_none() {
                    debug!(raw = %raw, "unrecognized intent label");
                }
                parsed
            }
            Ok(Err(e)) => {
                warn!(error = %e, "intent fallback failed");
                None
            }
            Err(_) => {
                warn!("intent fallback timed out");
                None
            }
        }
    }
}

/// Trim and lowercase
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Score one trigger table against normalized text, clamped to [0, 100]
pub fn score_triggers(text: &str, triggers: &IntentTriggers) -> f64 {
    let base = triggers
        .phrases
        .iter()
        .map(|phrase| phrase_score(phrase, text))
        .fold(0.0, f64::max);

    let verb_bonus = if base >= VERB_GATE {
        (count_verbs(text, &triggers.verbs) as f64 * VERB_BONUS).min(VERB_BONUS_CAP)
    } else {
        0.0
    };

    let length = text.chars().count();
    let penalty = if length < MIN_LENGTH || length > MAX_LENGTH {
        LENGTH_PENALTY
    } else {
        0.0
    };

    (base + verb_bonus - penalty).clamp(0.0, 100.0)
}

/// Short phrases match as word stems, longer ones fuzzily
fn phrase_score(phrase: &str, text: &str) -> f64 {
    if phrase.chars().count() < SHORT_PHRASE {
        if has_word_stem(text, phrase) {
            100.0
        } else {
            0.0
        }
    } else {
        partial_ratio(phrase, text)
    }
}

/// Accept only an exact label, ignoring case, quotes and trailing punctuation
fn parse_label(raw: &str) -> Option<Intent> {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c.is_whitespace())
        .to_uppercase();
    cleaned.parse().ok()
}
