//! HTTP surface

mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::app::App;
use crate::error::{Result, TutorError};

pub use handlers::*;

/// All routes, with the application as shared state
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Tutoring entry point
        .route("/human", post(human_handler))
        // Accounts
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/current_user", get(current_user_handler))
        // Quiz answers feeding the learning report
        .route("/answers", post(record_answer_handler))
        .with_state(app)
}

/// Bind and serve until ctrl-c
pub async fn serve(app: Arc<App>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Error response body: `{"code": -1, "msg": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::Auth(msg) => Self::new(StatusCode::CONFLICT, msg),
            other => {
                warn!(error = %other, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"code": -1, "msg": self.message}))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
