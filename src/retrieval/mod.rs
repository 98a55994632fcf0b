//! Grounded answers over the lecture passage index

mod index;

pub use index::*;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::llm::LanguageModel;

/// Context placeholder when no passage clears the relevance floor
pub const NO_CONTEXT: &str = "[None]";

const SNIPPET_CHARS: usize = 160;

const SYSTEM_PROMPT: &str = "You are the course's virtual teaching assistant. \
Use the provided lecture excerpts to answer the user's question. \
If the context is insufficient, say so explicitly. \
Do NOT invent content that is not in the excerpts. \
Answer first, then list citations at the end only if you used the excerpts.";

/// A passage that survived the relevance floor
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub source: String,
    pub page: u32,
    pub score: f64,
    pub snippet: String,
}

/// Everything sent to the model for one question
#[derive(Debug, Clone)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
    /// Numbered excerpt blocks, or [`NO_CONTEXT`]
    pub context: String,
    /// One `[filename p#]` line per distinct source page
    pub citations: Vec<String>,
}

impl From<&ScoredPassage> for RetrievalHit {
    fn from(scored: &ScoredPassage) -> Self {
        Self {
            source: scored.passage.source.clone(),
            page: scored.passage.page,
            score: scored.score,
            snippet: truncate_chars(&flatten(&scored.passage.text), SNIPPET_CHARS),
        }
    }
}

impl GroundedPrompt {
    pub fn has_context(&self) -> bool {
        self.context != NO_CONTEXT
    }
}

/// Answers free-text questions from the passage index through the language model
pub struct RetrievalAnswerer {
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LanguageModel>,
    config: RetrievalConfig,
}

impl RetrievalAnswerer {
    pub fn new(index: Arc<dyn VectorIndex>, llm: Arc<dyn LanguageModel>, config: RetrievalConfig) -> Self {
        Self { index, llm, config }
    }

    /// Search and keep only passages at or above the relevance floor
    pub async fn relevant_passages(&self, question: &str) -> Result<Vec<ScoredPassage>> {
        let hits = self.index.search(question, self.config.top_k).await?;
        let total = hits.len();
        let kept: Vec<ScoredPassage> = hits
            .into_iter()
            .filter(|h| h.score >= self.config.relevance_floor)
            .collect();
        debug!(total, kept = kept.len(), "passage search");
        Ok(kept)
    }

    pub fn build_prompt(&self, question: &str, passages: &[ScoredPassage]) -> GroundedPrompt {
        let (context, citations) = if passages.is_empty() {
            (NO_CONTEXT.to_string(), Vec::new())
        } else {
            (
                build_context(passages, self.config.passage_char_cap),
                format_citations(passages),
            )
        };

        let mut user = format!(
            "Question:\n{}\n\nRelevant lecture excerpts:\n{}\n\n\
             Instructions:\n\
             1. First, determine if the question is related to the lecture content.\n\
             2. If the question IS related AND you use specific information from the excerpts to answer it, then:\n\
             - Provide a clear answer\n\
             - Add a final line that starts with 'Citations:' and list each source in the format [filename p#]\n\
             3. If the question is NOT related to the lecture, OR if you don't use any excerpts in your answer:\n\
             - Provide a normal response\n\
             - DO NOT add the 'Citations:' line at all\n",
            question, context
        );

        if citations.is_empty() {
            user.push_str(
                "\nNo lecture excerpts were retrieved for this question. \
                 Answer from general knowledge and DO NOT add any citation.\n",
            );
        } else {
            user.push_str("\nSources available for citation:\n");
            user.push_str(&citations.join("\n"));
            user.push('\n');
        }

        GroundedPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
            context,
            citations,
        }
    }

    /// Answer a question; the model's text is returned as-is, citation line included
    pub async fn answer(&self, question: &str) -> Result<String> {
        let passages = self.relevant_passages(question).await?;
        for hit in passages.iter().map(RetrievalHit::from) {
            debug!(source = %hit.source, page = hit.page, score = hit.score, snippet = %hit.snippet, "passage kept");
        }

        let prompt = self.build_prompt(question, &passages);
        self.llm
            .complete(&prompt.system, &prompt.user, self.config.temperature)
            .await
    }
}

fn flatten(text: &str) -> String {
    text.replace('\n', " ")
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() > cap {
        let mut out: String = text.chars().take(cap).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}

fn build_context(passages: &[ScoredPassage], cap: usize) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "[{}] {}\n[Source {} p{}]",
                i + 1,
                truncate_chars(&flatten(&s.passage.text), cap),
                s.passage.source,
                s.passage.page
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_citations(passages: &[ScoredPassage]) -> Vec<String> {
    let mut seen = HashSet::new();
    passages
        .iter()
        .filter(|s| seen.insert((s.passage.source.as_str(), s.passage.page)))
        .map(|s| format!("[{} p{}]", s.passage.source, s.passage.page))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::TutorError;
    use std::sync::Mutex;

    struct FixedIndex(Vec<ScoredPassage>);

    #[async_trait::async_trait]
    impl VectorIndex for FixedIndex {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, system: &str, user: &str, _temperature: f32) -> Result<String> {
            self.prompts.lock().unwrap().push((system.to_string(), user.to_string()));
            Ok("An answer.\nCitations: [LT3_CS2313_arrays.pdf p4]".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn scored(source: &str, page: u32, score: f64, text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage {
                source: source.to_string(),
                page,
                text: text.to_string(),
            },
            score,
        }
    }

    fn answerer(passages: Vec<ScoredPassage>) -> (RetrievalAnswerer, Arc<RecordingModel>) {
        let model = Arc::new(RecordingModel::default());
        let answerer = RetrievalAnswerer::new(
            Arc::new(FixedIndex(passages)),
            model.clone(),
            Config::default().retrieval,
        );
        (answerer, model)
    }

    #[tokio::test]
    async fn test_no_relevant_passages_uses_marker() {
        let (answerer, model) = answerer(vec![scored("a.pdf", 1, 0.49, "barely related")]);

        let passages = answerer.relevant_passages("what is recursion").await.unwrap();
        assert!(passages.is_empty());

        let prompt = answerer.build_prompt("what is recursion", &passages);
        assert_eq!(prompt.context, NO_CONTEXT);
        assert!(!prompt.has_context());
        assert!(prompt.citations.is_empty());
        assert!(prompt.user.contains("DO NOT add any citation"));

        answerer.answer("what is recursion").await.unwrap();
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("Relevant lecture excerpts:\n[None]"));
    }

    #[tokio::test]
    async fn test_floor_is_inclusive() {
        let (answerer, _) = answerer(vec![
            scored("a.pdf", 1, 0.5, "exactly at the floor"),
            scored("b.pdf", 2, 0.2, "below"),
        ]);
        let passages = answerer.relevant_passages("q").await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].passage.source, "a.pdf");
    }

    #[tokio::test]
    async fn test_citation_format_and_dedup() {
        let (answerer, _) = answerer(vec![
            scored("LT3_CS2313_arrays.pdf", 4, 0.9, "2D arrays"),
            scored("LT3_CS2313_arrays.pdf", 4, 0.8, "more on 2D arrays"),
            scored("LT4_CS2313_pointers.pdf", 2, 0.7, "pointers"),
        ]);

        let passages = answerer.relevant_passages("arrays").await.unwrap();
        let prompt = answerer.build_prompt("arrays", &passages);

        assert_eq!(
            prompt.citations,
            vec!["[LT3_CS2313_arrays.pdf p4]", "[LT4_CS2313_pointers.pdf p2]"]
        );
        assert!(prompt.context.contains("[1] 2D arrays\n[Source LT3_CS2313_arrays.pdf p4]"));
        assert!(prompt.user.contains("[filename p#]"));
    }

    #[test]
    fn test_passage_text_is_capped() {
        let (answerer, _) = answerer(Vec::new());
        let long = "x".repeat(5000);
        let prompt = answerer.build_prompt("q", &[scored("a.pdf", 1, 0.9, &long)]);
        let expected = format!("[1] {}...", "x".repeat(1200));
        assert!(prompt.context.starts_with(&expected));
        assert!(!prompt.context.contains(&"x".repeat(1201)));
    }

    #[tokio::test]
    async fn test_answer_returns_model_text() {
        let (answerer, _) = answerer(vec![scored("LT3_CS2313_arrays.pdf", 4, 0.9, "2D arrays")]);
        let answer = answerer.answer("2D arrays?").await.unwrap();
        assert!(answer.ends_with("Citations: [LT3_CS2313_arrays.pdf p4]"));
    }

    #[test]
    fn test_hit_snippet_is_flat_and_short() {
        let hit = RetrievalHit::from(&scored("a.pdf", 3, 0.8, &"line\n".repeat(100)));
        assert_eq!(hit.page, 3);
        assert_eq!(hit.source, "a.pdf");
        assert!(hit.snippet.ends_with("..."));
        assert!(!hit.snippet.contains('\n'));
        assert_eq!(hit.snippet.chars().count(), SNIPPET_CHARS + 3);
    }

    #[tokio::test]
    async fn test_index_failure_propagates() {
        struct BrokenIndex;

        #[async_trait::async_trait]
        impl VectorIndex for BrokenIndex {
            async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredPassage>> {
                Err(TutorError::Index("unreachable".to_string()))
            }
        }

        let answerer = RetrievalAnswerer::new(
            Arc::new(BrokenIndex),
            Arc::new(RecordingModel::default()),
            Config::default().retrieval,
        );
        assert!(answerer.answer("q").await.is_err());
    }
}
