//! End-to-end routing through sessions, the component pool and the scripted model

mod common;

use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use tutorlink::intent::Intent;
use tutorlink::router::{Action, LOGIN_REQUIRED_REPLY, REPEAT_REPLY, SERVICE_UNAVAILABLE_REPLY, SYSTEM_ERROR_REPLY};
use tutorlink::session::GUEST_USER;
use tutorlink::store::DocumentStore;
use tutorlink::{Config, IndexSource, UtteranceKind};

#[tokio::test]
async fn test_learning_report_for_logged_in_user() {
    let h = harness();
    for _ in 0..4 {
        h.store.record_answer("alice", wrong("Pointers")).await.unwrap();
    }
    h.store.record_answer("alice", wrong("Recursion")).await.unwrap();

    let session = h.app.sessions.login(None, "alice");
    let reply = h
        .app
        .router
        .handle(&ctx(), Some(session.id()), "can you give me my learning report", UtteranceKind::Echo)
        .await;

    assert_eq!(reply.code, 0);
    assert_eq!(reply.intent, Some(Intent::LearningReport));
    assert!(reply.reply.contains("Weak-area Analysis"));
    assert!(reply.reply.contains("Pointers.\n"));
    assert!(!reply.questions.is_empty() && reply.questions.len() <= 3);
    assert_eq!(reply.questions[0], "What does the & operator return? Answer: The address of its operand");

    // Keyword path: the classifier never asked the model
    assert_eq!(h.model.classifier_calls.load(Ordering::SeqCst), 0);

    let prompts = h.model.prompts.lock().unwrap();
    let report_prompt = prompts.iter().find(|p| p.contains("Student answer data")).unwrap();
    assert!(report_prompt.contains("\"Pointers\":{\"wrong\":4}"));
    assert!(report_prompt.contains("\"Recursion\":{\"wrong\":1}"));
    assert!(report_prompt.contains("\"weak_points\":[\"Pointers\"]"));
}

#[tokio::test]
async fn test_learning_report_requires_login() {
    let h = harness();
    let reply = h
        .app
        .router
        .handle(&ctx(), None, "show me my study report", UtteranceKind::Echo)
        .await;

    assert_eq!(reply.code, 0);
    assert_eq!(reply.reply, LOGIN_REQUIRED_REPLY);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_report_model_failure_is_service_unavailable() {
    let h = harness_with(
        ScriptedModel::failing(),
        IndexSource::Ready(Arc::new(lecture_index())),
        Config::default(),
    );
    let session = h.app.sessions.login(None, "alice");
    let reply = h
        .app
        .router
        .handle(&ctx(), Some(session.id()), "generate my learning report", UtteranceKind::Echo)
        .await;

    assert_eq!(reply.code, 1);
    assert_eq!(reply.reply, SERVICE_UNAVAILABLE_REPLY);
}

#[tokio::test]
async fn test_quiz_is_idempotent() {
    let h = harness();
    let first = h
        .app
        .router
        .handle(&ctx(), None, "I want to do a quiz", UtteranceKind::Echo)
        .await;

    assert_eq!(first.code, 0);
    assert_eq!(first.action, Some(Action::OpenQuiz));
    let url = first.quiz_url.clone().unwrap();
    assert!(!url.is_empty());

    let second = h
        .app
        .router
        .handle(&ctx(), Some(&first.session_id), "I want to do a quiz", UtteranceKind::Echo)
        .await;

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.quiz_url, Some(url));
    assert_eq!(h.quiz.provisions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_normal_chat_uses_retrieval() {
    let h = harness();
    let reply = h
        .app
        .router
        .handle(&ctx(), None, "How is a 2D array declared in C++?", UtteranceKind::Echo)
        .await;

    assert_eq!(reply.code, 0);
    assert_eq!(reply.intent, Some(Intent::NormalChat));
    assert!(reply.reply.ends_with("Citations: [LT3_CS2313_arrays.pdf p4]"));

    let prompts = h.model.prompts.lock().unwrap();
    assert!(prompts.iter().any(|p| p.contains("[Source LT3_CS2313_arrays.pdf p4]")));
}

#[tokio::test]
async fn test_course_questions_are_not_quiz_requests() {
    let h = harness();
    for text in ["explain the latest lecture", "what is a unit test", "how do I quit a loop"] {
        let reply = h.app.router.handle(&ctx(), None, text, UtteranceKind::Echo).await;
        assert_eq!(reply.intent, Some(Intent::NormalChat), "text: {text}");
        assert_eq!(reply.action, None, "text: {text}");
        assert!(reply.reply.contains("Citations:"), "text: {text}");
    }
    assert_eq!(h.quiz.provisions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plain_chat_keeps_history() {
    let h = harness();
    let first = h
        .app
        .router
        .handle(&ctx(), None, "hello there", UtteranceKind::Chat)
        .await;
    h.app
        .router
        .handle(&ctx(), Some(&first.session_id), "and again", UtteranceKind::Chat)
        .await;

    let session = h.app.sessions.get(&first.session_id).unwrap();
    assert_eq!(session.history().len(), 4);

    let prompts = h.model.prompts.lock().unwrap();
    assert!(prompts[1].contains("User: hello there\nAssistant: Happy to help with your studies.\n"));
    assert_eq!(h.model.classifier_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_utterance_asks_to_repeat() {
    let h = harness();
    let reply = h.app.router.handle(&ctx(), None, "   ", UtteranceKind::Echo).await;
    assert_eq!(reply.reply, REPEAT_REPLY);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert!(h.app.sessions.pool().is_empty());
}

#[tokio::test]
async fn test_missing_index_degrades_without_poisoning_pool() {
    let h = harness_with(
        ScriptedModel::new(),
        IndexSource::File(PathBuf::from("/definitely/not/here/passages.json")),
        Config::default(),
    );

    let reply = h
        .app
        .router
        .handle(&ctx(), None, "what is a pointer", UtteranceKind::Echo)
        .await;

    assert_eq!(reply.code, 1);
    assert_eq!(reply.reply, SYSTEM_ERROR_REPLY);
    assert!(h.app.sessions.pool().is_empty());
}

#[tokio::test]
async fn test_guest_sessions_share_components() {
    let h = harness();
    let a = h.app.router.handle(&ctx(), None, "hello", UtteranceKind::Chat).await;
    let b = h.app.router.handle(&ctx(), None, "hello", UtteranceKind::Chat).await;

    assert_ne!(a.session_id, b.session_id);
    assert_eq!(h.app.sessions.pool().len(), 1);
    assert_eq!(h.app.sessions.pool().refcount(GUEST_USER), Some(2));
}

#[tokio::test]
async fn test_logout_releases_components() {
    let h = harness();
    let session = h.app.sessions.login(None, "alice");
    h.app
        .router
        .handle(&ctx(), Some(session.id()), "hello", UtteranceKind::Chat)
        .await;
    assert_eq!(h.app.sessions.pool().refcount("alice"), Some(1));

    assert!(h.app.sessions.invalidate(session.id()));
    assert_eq!(h.app.sessions.pool().refcount("alice"), Some(0));

    // Unknown id after logout starts a fresh anonymous session
    let reply = h
        .app
        .router
        .handle(&ctx(), Some(session.id()), "hello", UtteranceKind::Chat)
        .await;
    assert_ne!(reply.session_id, session.id());
}
