//! API request and response structures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::TimerError,
    state::{StudyId, StudySessionState},
};

/// Response for every endpoint that acts on a study session
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub session: StudySessionState,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, session: StudySessionState) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            session,
        }
    }
}

/// Error body returned for any failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl IntoResponse for TimerError {
    fn into_response(self) -> Response {
        let code = match &self {
            TimerError::InvalidTransition(_)
            | TimerError::ProcessNotRunning
            | TimerError::StudyFinalized(_)
            | TimerError::TransitionInFlight => StatusCode::CONFLICT,
            TimerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TimerError::NotFound(_) => StatusCode::NOT_FOUND,
            TimerError::Transport(_) => StatusCode::BAD_GATEWAY,
            TimerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            status: "error".to_string(),
            kind: self.kind().to_string(),
            message: self.to_string(),
            timestamp: Utc::now(),
        };
        (code, Json(body)).into_response()
    }
}

/// Body of `POST /studies/:id/stop`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopRequest {
    pub notes: Option<String>,
}

/// Body of `POST /studies/:id/scrap`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapRequest {
    #[serde(default)]
    pub notes: String,
}

/// Body of `POST /studies/:id/reset`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub confirm: bool,
}

/// Body of `POST /studies/:id/steps/:step_id/start`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepStartRequest {
    #[serde(default)]
    pub confirm_re_time: bool,
}

/// Service status with open sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub open_studies: Vec<StudyId>,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
