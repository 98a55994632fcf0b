//! Learning reports built from a learner's recorded answers

mod parser;

pub use parser::{parse_practice_questions, PracticeQuestion};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ReportConfig;
use crate::error::{Result, TutorError};
use crate::llm::LanguageModel;
use crate::store::{DocumentStore, WrongAnswerRecord};

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])").expect("valid regex"));

const SYSTEM_PROMPT: &str = "You are a personalized learning coach.";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgePointStats {
    pub wrong: usize,
}

/// Mismatch counts per knowledge point
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeakAreaStats {
    /// Only knowledge points with at least one mismatch
    pub knowledge_points: BTreeMap<String, KnowledgePointStats>,
    /// Knowledge points whose mismatch count reached the weak threshold
    pub weak_points: Vec<String>,
}

impl WeakAreaStats {
    pub fn from_records(records: &[WrongAnswerRecord], weak_threshold: usize) -> Self {
        let mut knowledge_points: BTreeMap<String, KnowledgePointStats> = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_mismatch()) {
            knowledge_points
                .entry(record.knowledge_point.clone())
                .or_default()
                .wrong += 1;
        }

        let weak_points = knowledge_points
            .iter()
            .filter(|(_, stats)| stats.wrong >= weak_threshold)
            .map(|(kp, _)| kp.clone())
            .collect();

        Self {
            knowledge_points,
            weak_points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge_points.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LearningReport {
    /// Analysis text with a line break after every sentence end
    pub text: String,
    /// Practice questions flattened to `question Answer: answer`
    pub questions: Vec<String>,
    pub practice: Vec<PracticeQuestion>,
    pub stats: WeakAreaStats,
}

#[derive(Serialize)]
struct UserData<'a> {
    user_id: &'a str,
    knowledge_points: &'a BTreeMap<String, KnowledgePointStats>,
    weak_points: &'a [String],
}

/// Turns wrong-answer history into a coaching report
pub struct ReportAnalyzer {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn LanguageModel>,
    config: ReportConfig,
}

impl ReportAnalyzer {
    pub fn new(store: Arc<dyn DocumentStore>, llm: Arc<dyn LanguageModel>, config: ReportConfig) -> Self {
        Self { store, llm, config }
    }

    pub async fn stats(&self, user_id: &str) -> Result<WeakAreaStats> {
        let records = self.store.get_wrong_answers(user_id).await?;
        Ok(WeakAreaStats::from_records(&records, self.config.weak_threshold))
    }

    pub async fn analyze(&self, user_id: &str) -> Result<LearningReport> {
        let stats = self.stats(user_id).await?;
        info!(
            user = user_id,
            knowledge_points = stats.knowledge_points.len(),
            weak = stats.weak_points.len(),
            "building learning report"
        );

        let prompt = build_prompt(user_id, &stats)?;
        let raw = self
            .llm
            .complete(SYSTEM_PROMPT, &prompt, self.config.temperature)
            .await
            .map_err(|e| {
                warn!(user = user_id, error = %e, "report generation failed");
                TutorError::ServiceUnavailable(format!("learning report: {}", e))
            })?;

        let practice = parse_practice_questions(&raw);
        debug!(questions = practice.len(), "practice questions parsed");

        Ok(LearningReport {
            text: break_sentences(&raw),
            questions: practice.iter().map(PracticeQuestion::flatten).collect(),
            practice,
            stats,
        })
    }
}

fn build_prompt(user_id: &str, stats: &WeakAreaStats) -> Result<String> {
    let user_data = serde_json::to_string(&UserData {
        user_id,
        knowledge_points: &stats.knowledge_points,
        weak_points: &stats.weak_points,
    })?;

    Ok(format!(
        "Based on the following student knowledge point data (in JSON), analyze the student's weak areas, \
         give concrete suggestions for improvement, and generate 3 targeted practice questions with answers \
         for each weak knowledge point. Questions should be relevant to the original knowledge points.\n\n\
         Please format your response with clear line breaks and sections. Use the following structure exactly:\n\n\
         Weak-area Analysis\n\
         [Your analysis here - use multiple lines if needed]\n\n\
         Concrete Improvement Suggestions\n\
         1. [Suggestion 1]\n\
         2. [Suggestion 2]\n\
         3. [Suggestion 3]\n\n\
         Targeted Practice Questions\n\
         Knowledge Point: [Knowledge Point Name]\n\
         Question 1: [Question text]\n\
         Answer: [Answer]\n\n\
         Question 2: [Question text]\n\
         Answer: [Answer]\n\n\
         Question 3: [Question text]\n\
         Answer: [Answer]\n\n\
         Student answer data:\n\
         {}\n",
        user_data
    ))
}

/// Insert a line break after every `.`, `!` and `?`
pub fn break_sentences(text: &str) -> String {
    SENTENCE_END.replace_all(text, "${1}\n").into_owned()
}
