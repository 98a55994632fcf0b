//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tutorlink::llm::LanguageModel;
use tutorlink::quiz::QuizLauncher;
use tutorlink::retrieval::{Passage, ScoredPassage, VectorIndex};
use tutorlink::store::{DocumentStore, JsonDocumentStore, WrongAnswerRecord};
use tutorlink::{App, AppParts, Config, IndexSource, RequestContext, Result, TutorError};

pub const REPORT_REPLY: &str = "Weak-area Analysis\n\
You keep missing questions on Pointers. Recursion looks mostly fine.\n\n\
Concrete Improvement Suggestions\n\
1. Redraw memory diagrams for each pointer exercise.\n\
2. Trace dereferences by hand.\n\
3. Review the lecture on pointer arithmetic.\n\n\
Targeted Practice Questions\n\
Knowledge Point: Pointers\n\
Question 1: What does the & operator return?\n\
Answer: The address of its operand\n\n\
Question 2: What is printed by *p after int x = 3; int *p = &x;?\n\
Answer: 3\n";

/// Replies by matching the system prompt; counts every call
pub struct ScriptedModel {
    pub calls: AtomicUsize,
    pub classifier_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    pub classifier_label: &'static str,
    pub fail: bool,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            classifier_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            classifier_label: "NORMAL_CHAT",
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(user.to_string());

        if system.contains("intent classifier") {
            self.classifier_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.classifier_label.to_string());
        }
        if self.fail {
            return Err(TutorError::Provider("upstream returned 503".to_string()));
        }
        if system.contains("learning coach") {
            return Ok(REPORT_REPLY.to_string());
        }
        if system.contains("study assistant") {
            return Ok("Happy to help with your studies.".to_string());
        }
        Ok("A 2D array is declared with two sizes.\nCitations: [LT3_CS2313_arrays.pdf p4]".to_string())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Returns the same passages for every query
pub struct FixedIndex(pub Vec<ScoredPassage>);

#[async_trait::async_trait]
impl VectorIndex for FixedIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

pub fn lecture_index() -> FixedIndex {
    FixedIndex(vec![ScoredPassage {
        passage: Passage {
            source: "LT3_CS2313_arrays.pdf".to_string(),
            page: 4,
            text: "A 2D array is declared as type name[rows][cols].".to_string(),
        },
        score: 0.82,
    }])
}

/// Hands out a fixed URL and counts provisioning
pub struct CountingQuiz {
    pub provisions: AtomicUsize,
    url: Mutex<Option<String>>,
}

impl CountingQuiz {
    pub fn new() -> Self {
        Self {
            provisions: AtomicUsize::new(0),
            url: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl QuizLauncher for CountingQuiz {
    async fn become_reachable(&self, ctx: &RequestContext) -> Result<String> {
        let mut url = self.url.lock().unwrap();
        if url.is_none() {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            let host = ctx
                .host
                .as_deref()
                .and_then(|h| h.split(':').next())
                .unwrap_or("127.0.0.1");
            *url = Some(format!("{}://{}:50012/dashboard", ctx.scheme, host));
        }
        Ok(url.clone().unwrap_or_default())
    }
}

pub fn wrong(kp: &str) -> WrongAnswerRecord {
    WrongAnswerRecord {
        knowledge_point: kp.to_string(),
        question: String::new(),
        user_answer: "A".to_string(),
        std_answer: "B".to_string(),
        timestamp: Utc::now(),
    }
}

pub struct Harness {
    pub app: Arc<App>,
    pub model: Arc<ScriptedModel>,
    pub quiz: Arc<CountingQuiz>,
    pub store: Arc<JsonDocumentStore>,
}

pub fn harness_with(model: ScriptedModel, index: IndexSource, config: Config) -> Harness {
    let model = Arc::new(model);
    let quiz = Arc::new(CountingQuiz::new());
    let store = Arc::new(JsonDocumentStore::in_memory());
    let store_dyn: Arc<dyn DocumentStore> = store.clone();

    let app = App::from_parts(
        config,
        AppParts {
            llm: model.clone(),
            store: store_dyn,
            index,
            quiz: quiz.clone(),
        },
    );

    Harness {
        app: Arc::new(app),
        model,
        quiz,
        store,
    }
}

pub fn harness() -> Harness {
    harness_with(
        ScriptedModel::new(),
        IndexSource::Ready(Arc::new(lecture_index())),
        Config::default(),
    )
}

pub fn ctx() -> RequestContext {
    RequestContext {
        host: Some("192.168.1.20:8010".to_string()),
        scheme: "http".to_string(),
    }
}
