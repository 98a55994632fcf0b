//! Passage index used for similarity search

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{Result, TutorError};

/// One searchable slice of a lecture document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// File the passage came from, e.g. `LT3_CS2313_arrays.pdf`
    pub source: String,
    /// 1-based page number
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Similarity in [0, 1], higher is closer
    pub score: f64,
}

/// Read-only similarity search over prebuilt passages
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>>;
}

type TermVector = HashMap<String, f64>;

/// In-process index scoring passages by cosine similarity of term-frequency vectors
pub struct LexicalIndex {
    passages: Vec<Passage>,
    vectors: Vec<TermVector>,
}

impl LexicalIndex {
    pub fn new(passages: Vec<Passage>) -> Self {
        let vectors = passages.iter().map(|p| term_vector(&p.text)).collect();
        Self { passages, vectors }
    }

    /// Load passages from a JSON array file. A missing file is an error,
    /// an empty array is a valid empty corpus.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TutorError::Index(format!(
                "passage index not found at {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let passages: Vec<Passage> = serde_json::from_str(&content)?;
        info!(passages = passages.len(), path = %path.display(), "passage index loaded");
        Ok(Self::new(passages))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait::async_trait]
impl VectorIndex for LexicalIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        let query_vec = term_vector(query);
        if query_vec.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredPassage> = self
            .passages
            .iter()
            .zip(&self.vectors)
            .map(|(passage, vector)| ScoredPassage {
                passage: passage.clone(),
                score: cosine(&query_vec, vector),
            })
            .filter(|s| s.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn term_vector(text: &str) -> TermVector {
    let mut vector = TermVector::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
    {
        *vector.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    vector
}

fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
