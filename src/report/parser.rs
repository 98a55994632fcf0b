//! Practice question extraction from generated report text
//!
//! Two layouts are understood, optionally grouped under `Knowledge Point: X`
//! or `[KP] X` headers:
//!
//! ```text
//! Question 1: What does a base case do?
//! A. ...
//! Answer: It stops the recursion
//! Explanation: ...
//! ```
//!
//! and the compact form `1) What does a base case do? Answer: It stops the recursion`.
//! Lines matching neither are ignored.

use once_cell::sync::Lazy;
use regex::Regex;

static QUESTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^question(?:\s*\d+)?\s*[:：]\s*(.*)$").expect("valid regex"));
static OPTION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[ABCD][.)]\s").expect("valid regex"));
static ANSWER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^answer\s*[:：]\s*(.*)$").expect("valid regex"));
static EXPLANATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^explanation\s*[:：]\s*(.*)$").expect("valid regex"));
static COMPACT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+\)\s*(.+?)\s*Answer:\s*(.+?)\s*(?:Explanation:\s*(.+))?$").expect("valid regex"));
static KP_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:knowledge point\s*[:：]|\[kp\])\s*(.+)$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeQuestion {
    pub knowledge_point: String,
    /// Question text, with `Options:` lines appended when present
    pub question: String,
    pub answer: String,
    pub explanation: String,
}

impl PracticeQuestion {
    /// Single-line rendering used in the flattened question list
    pub fn flatten(&self) -> String {
        format!("{} Answer: {}", self.question, self.answer)
    }
}

/// Parse every practice question in `text`
pub fn parse_practice_questions(text: &str) -> Vec<PracticeQuestion> {
    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();

    // Lines before the first header only count for the anonymous pass below
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = KP_HEADER.captures(trimmed) {
            blocks.push((caps[1].trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = blocks.last_mut() {
            lines.push(trimmed);
        }
    }

    let mut results: Vec<PracticeQuestion> = blocks
        .iter()
        .flat_map(|(kp, lines)| parse_block(kp, lines))
        .collect();

    if results.is_empty() {
        let all: Vec<&str> = text.lines().map(str::trim).collect();
        results = parse_block("", &all);
    }

    results
}

fn parse_block(kp: &str, lines: &[&str]) -> Vec<PracticeQuestion> {
    let mut out = parse_verbose(kp, lines);
    out.extend(parse_compact(kp, lines));
    out
}

#[derive(Default)]
struct Pending {
    question: Option<String>,
    options: Vec<String>,
    answer: Option<String>,
    explanation: Option<String>,
}

impl Pending {
    fn finish(&mut self, kp: &str, out: &mut Vec<PracticeQuestion>) {
        let pending = std::mem::take(self);
        if let (Some(question), Some(answer)) = (pending.question, pending.answer) {
            let question = if pending.options.is_empty() {
                question
            } else {
                format!("{}\nOptions:\n{}", question, pending.options.join("\n"))
            };
            out.push(PracticeQuestion {
                knowledge_point: kp.to_string(),
                question,
                answer,
                explanation: pending.explanation.unwrap_or_default(),
            });
        }
    }
}

fn parse_verbose(kp: &str, lines: &[&str]) -> Vec<PracticeQuestion> {
    let mut out = Vec::new();
    let mut pending = Pending::default();

    for line in lines {
        if let Some(caps) = QUESTION_LINE.captures(line) {
            pending.finish(kp, &mut out);
            pending.question = Some(caps[1].trim().to_string());
        } else if pending.question.is_none() {
            continue;
        } else if OPTION_LINE.is_match(line) {
            pending.options.push(line.to_string());
        } else if let Some(caps) = ANSWER_LINE.captures(line) {
            pending.answer = Some(caps[1].trim().to_string());
        } else if let Some(caps) = EXPLANATION_LINE.captures(line) {
            pending.explanation = Some(caps[1].trim().to_string());
        }
    }
    pending.finish(kp, &mut out);

    out
}

fn parse_compact(kp: &str, lines: &[&str]) -> Vec<PracticeQuestion> {
    let lines: Vec<&str> = lines.iter().copied().filter(|l| !l.is_empty()).collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if let Some(caps) = COMPACT_LINE.captures(lines[i]) {
            let mut explanation = caps.get(3).map(|m| m.as_str().trim().to_string());
            if explanation.is_none() {
                if let Some(caps) = lines.get(i + 1).and_then(|next| EXPLANATION_LINE.captures(next)) {
                    explanation = Some(caps[1].trim().to_string());
                    i += 1;
                }
            }
            out.push(PracticeQuestion {
                knowledge_point: kp.to_string(),
                question: caps[1].trim().to_string(),
                answer: caps[2].trim().to_string(),
                explanation: explanation.unwrap_or_default(),
            });
        }
        i += 1;
    }

    out
}
