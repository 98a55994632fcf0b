//! Trigger phrases and action verbs for each routable intent

use super::Intent;

/// Phrases that identify an intent, plus verbs that reinforce it
#[derive(Debug, Clone)]
pub struct IntentTriggers {
    pub intent: Intent,
    pub phrases: Vec<&'static str>,
    pub verbs: Vec<&'static str>,
}

/// Trigger tables for the intents that have a keyword fast path.
/// `NormalChat` has none; it is what everything else falls back to.
pub fn default_triggers() -> Vec<IntentTriggers> {
    vec![
        IntentTriggers {
            intent: Intent::LearningReport,
            phrases: vec![
                "learning report", "study report", "study summary", "study review",
                "weekly report", "monthly report", "reflection", "progress report",
                "study log", "learning recap",
            ],
            verbs: vec![
                "output", "generate", "write", "create", "export", "summarize", "compile", "show",
            ],
        },
        IntentTriggers {
            intent: Intent::Quiz,
            phrases: vec![
                "quiz", "take a quiz", "quiz me", "practice quiz", "mock exam",
            ],
            verbs: vec!["take", "start", "begin", "do", "try", "practice"],
        },
    ]
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

/// Number of `verbs` present as whole words in `text`
pub fn count_verbs(text: &str, verbs: &[&str]) -> usize {
    let words: Vec<&str> = words(text).collect();
    verbs.iter().filter(|v| words.contains(v)).count()
}

/// Whether some word of `text` starts with `stem` ("quiz" matches "quizzes", not "quit")
pub fn has_word_stem(text: &str, stem: &str) -> bool {
    words(text).any(|w| w.starts_with(stem))
}
