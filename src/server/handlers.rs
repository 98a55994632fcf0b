use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ApiError, ApiResult};
use crate::app::App;
use crate::router::{RequestContext, RouterReply, UtteranceKind};
use crate::store::{User, WrongAnswerRecord};

const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Deserialize)]
pub struct HumanRequest {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: UtteranceKind,
    #[serde(alias = "sessionid", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(alias = "sessionid", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionRef {
    #[serde(alias = "sessionid", default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub code: i32,
    pub session_id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub is_authenticated: bool,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub code: i32,
    pub msg: String,
}

impl AckResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            code: 0,
            msg: "ok".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    #[serde(alias = "sessionid")]
    pub session_id: String,
    pub knowledge_point: String,
    #[serde(default)]
    pub question: String,
    pub user_answer: String,
    pub std_answer: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub sessions: usize,
    pub pooled_users: usize,
}

/// Host and scheme as the client saw them
pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_lowercase())
        .filter(|s| s == "http" || s == "https")
        .unwrap_or_else(|| "http".to_string());

    RequestContext { host, scheme }
}

pub async fn health_handler(State(app): State<Arc<App>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: app.model_name().to_string(),
        sessions: app.sessions.len(),
        pooled_users: app.sessions.pool().len(),
    })
}

pub async fn human_handler(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    body: Result<Json<HumanRequest>, JsonRejection>,
) -> Json<RouterReply> {
    let ctx = request_context(&headers);

    // An unreadable body is answered like an empty utterance
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "unreadable utterance body");
            HumanRequest {
                text: String::new(),
                kind: UtteranceKind::Echo,
                session_id: None,
            }
        }
    };

    let reply = app
        .router
        .handle(&ctx, req.session_id.as_deref(), &req.text, req.kind)
        .await;
    Json(reply)
}

pub async fn register_handler(
    State(app): State<Arc<App>>,
    Json(req): Json<Credentials>,
) -> ApiResult<Json<AckResponse>> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::bad_request("username is required"));
    }
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }

    app.store.save_user(User::new(username, &req.password, false)).await?;
    info!(user = username, "user registered");
    Ok(AckResponse::ok())
}

pub async fn login_handler(
    State(app): State<Arc<App>>,
    Json(req): Json<Credentials>,
) -> ApiResult<Json<AuthResponse>> {
    let user = app
        .store
        .get_user(req.username.trim())
        .await?
        .filter(|u| u.verify_password(&req.password))
        .ok_or_else(|| ApiError::unauthorized("invalid username or password"))?;

    let session = app.sessions.login(req.session_id.as_deref(), &user.username);
    Ok(Json(AuthResponse {
        code: 0,
        session_id: session.id().to_string(),
        username: user.username,
    }))
}

pub async fn logout_handler(State(app): State<Arc<App>>, Json(req): Json<SessionRef>) -> Json<AckResponse> {
    if let Some(id) = req.session_id.as_deref() {
        app.sessions.invalidate(id);
    }
    AckResponse::ok()
}

pub async fn current_user_handler(
    State(app): State<Arc<App>>,
    Query(req): Query<SessionRef>,
) -> Json<CurrentUserResponse> {
    let username = req
        .session_id
        .as_deref()
        .and_then(|id| app.sessions.get(id))
        .and_then(|s| s.user().map(str::to_string));

    Json(CurrentUserResponse {
        is_authenticated: username.is_some(),
        username,
    })
}

pub async fn record_answer_handler(
    State(app): State<Arc<App>>,
    Json(req): Json<AnswerRequest>,
) -> ApiResult<Json<AckResponse>> {
    let session = app
        .sessions
        .get(&req.session_id)
        .ok_or_else(|| ApiError::unauthorized("login required"))?;
    let user = session
        .user()
        .ok_or_else(|| ApiError::unauthorized("login required"))?;

    let record = WrongAnswerRecord {
        knowledge_point: req.knowledge_point,
        question: req.question,
        user_answer: req.user_answer,
        std_answer: req.std_answer,
        timestamp: Utc::now(),
    };
    app.store.record_answer(user, record).await?;
    Ok(AckResponse::ok())
}
