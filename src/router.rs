//! Single entry point from the transport layer into the tutoring components

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chat::ChatTurn;
use crate::error::{Result, TutorError};
use crate::intent::Intent;
use crate::quiz::QuizLauncher;
use crate::session::{SessionHandle, SessionRegistry, UserComponents};

pub const REPEAT_REPLY: &str = "I may not understand what you said, could you please say it again?";
pub const SYSTEM_ERROR_REPLY: &str =
    "Sorry, there seems to be some problem with my system, please contact the developer!";
pub const SERVICE_UNAVAILABLE_REPLY: &str =
    "Sorry, the learning report service is unavailable right now. Please try again later.";
pub const LOGIN_REQUIRED_REPLY: &str = "Please log in first so I can look at your answer history.";
pub const TIMEOUT_REPLY: &str = "Sorry, that took too long. Please try again.";
pub const QUIZ_REPLY: &str = "Sure! The quiz is ready, opening it for you now.";

/// What the transport knows about the inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// `Host` header as received, port included
    pub host: Option<String>,
    /// "http" or "https"
    pub scheme: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            host: None,
            scheme: "http".to_string(),
        }
    }
}

/// Declared utterance type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtteranceKind {
    /// Routed through intent classification
    #[default]
    Echo,
    /// Plain conversation with history
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenQuiz,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterReply {
    /// 0 on success, 1 when the reply is an apology for a failure
    pub code: i32,
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub session_id: String,
}

impl RouterReply {
    fn ok(session: &SessionHandle, reply: impl Into<String>) -> Self {
        Self {
            code: 0,
            reply: reply.into(),
            action: None,
            quiz_url: None,
            questions: Vec::new(),
            intent: None,
            session_id: session.id().to_string(),
        }
    }

    fn apology(session: &SessionHandle, reply: &str) -> Self {
        Self {
            code: 1,
            ..Self::ok(session, reply)
        }
    }

    fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }
}

pub struct RequestRouter {
    sessions: Arc<SessionRegistry>,
    quiz: Arc<dyn QuizLauncher>,
    request_timeout: Duration,
}

impl RequestRouter {
    pub fn new(sessions: Arc<SessionRegistry>, quiz: Arc<dyn QuizLauncher>, request_timeout: Duration) -> Self {
        Self {
            sessions,
            quiz,
            request_timeout,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Handle one utterance. Always returns a well-formed reply.
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        session_id: Option<&str>,
        utterance: &str,
        kind: UtteranceKind,
    ) -> RouterReply {
        let session = self.sessions.touch(session_id);
        let utterance = utterance.trim();

        if utterance.is_empty() {
            return RouterReply::ok(&session, REPEAT_REPLY);
        }

        let work = async {
            let components = match session.components() {
                Ok(components) => components,
                Err(e) => {
                    error!(session = session.id(), error = %e, "components unavailable");
                    return RouterReply::apology(&session, SYSTEM_ERROR_REPLY);
                }
            };

            match kind {
                UtteranceKind::Chat => self.plain_chat(&session, &components, utterance).await,
                UtteranceKind::Echo => {
                    let intent = components.classifier.classify(utterance).await;
                    info!(session = session.id(), intent = %intent, "utterance routed");
                    self.dispatch(intent, ctx, &session, &components, utterance)
                        .await
                        .with_intent(intent)
                }
            }
        };

        match tokio::time::timeout(self.request_timeout, work).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!(session = session.id(), "request timed out");
                RouterReply::apology(&session, TIMEOUT_REPLY)
            }
        }
    }

    async fn dispatch(
        &self,
        intent: Intent,
        ctx: &RequestContext,
        session: &SessionHandle,
        components: &UserComponents,
        utterance: &str,
    ) -> RouterReply {
        match intent {
            Intent::LearningReport => self.learning_report(session, components).await,
            Intent::Quiz => self.open_quiz(ctx, session).await,
            Intent::NormalChat => self.grounded_answer(session, components, utterance).await,
        }
    }

    async fn learning_report(&self, session: &SessionHandle, components: &UserComponents) -> RouterReply {
        let Some(user) = session.user() else {
            return RouterReply::ok(session, LOGIN_REQUIRED_REPLY);
        };

        match components.analyzer.analyze(user).await {
            Ok(report) => RouterReply {
                questions: report.questions,
                ..RouterReply::ok(session, report.text)
            },
            Err(e) => {
                warn!(user, error = %e, "learning report failed");
                RouterReply::apology(session, SERVICE_UNAVAILABLE_REPLY)
            }
        }
    }

    async fn open_quiz(&self, ctx: &RequestContext, session: &SessionHandle) -> RouterReply {
        match self.quiz.become_reachable(ctx).await {
            Ok(url) => RouterReply {
                action: Some(Action::OpenQuiz),
                quiz_url: Some(url),
                ..RouterReply::ok(session, QUIZ_REPLY)
            },
            Err(e) => {
                warn!(error = %e, "quiz launch failed");
                RouterReply::apology(session, SYSTEM_ERROR_REPLY)
            }
        }
    }

    async fn grounded_answer(&self, session: &SessionHandle, components: &UserComponents, utterance: &str) -> RouterReply {
        reply_or_apology(session, components.retriever.answer(utterance).await)
    }

    async fn plain_chat(&self, session: &SessionHandle, components: &UserComponents, utterance: &str) -> RouterReply {
        let history = session.history();
        let result = components.chat.reply(&history, utterance).await;
        if let Ok(answer) = &result {
            session.push_history([ChatTurn::user(utterance), ChatTurn::assistant(answer.as_str())]);
            debug!(session = session.id(), turns = history.len() + 2, "chat history updated");
        }
        reply_or_apology(session, result)
    }
}

fn reply_or_apology(session: &SessionHandle, result: Result<String>) -> RouterReply {
    match result {
        Ok(answer) => RouterReply::ok(session, answer),
        Err(TutorError::Timeout(what)) => {
            warn!(what = %what, "model call timed out");
            RouterReply::apology(session, TIMEOUT_REPLY)
        }
        Err(e) => {
            warn!(error = %e, "answer failed");
            RouterReply::apology(session, SYSTEM_ERROR_REPLY)
        }
    }
}
