//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Json},
};
use tracing::info;

use super::responses::{
    ApiResponse, HealthResponse, ResetRequest, ScrapRequest, StatusResponse, StepStartRequest,
    StopRequest,
};
use crate::{
    error::TimerError,
    state::{AppState, StepId, StudyId},
    utils::format_hms,
};

type ApiResult<T> = Result<Json<T>, TimerError>;

/// Read an optional JSON body: no body means defaults, a bad one is an error
fn optional_body<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, TimerError> {
    match body {
        Ok(Json(request)) => Ok(request),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(TimerError::Validation(rejection.body_text())),
    }
}

/// Handle POST /studies/:id/open - Fetch a study and open its session
pub async fn open_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
) -> ApiResult<ApiResponse> {
    let session = state.open_study(study_id).await?;
    info!("Open endpoint called - study {} is {}", study_id, session.status);
    Ok(Json(ApiResponse::ok(format!("Study {} opened", study_id), session)))
}

/// Handle GET /studies/:id - Current session state
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
) -> ApiResult<ApiResponse> {
    let session = state.snapshot(study_id)?;
    Ok(Json(ApiResponse::ok(
        format!("Process timer at {}", format_hms(session.process.elapsed_seconds)),
        session,
    )))
}

/// Handle POST /studies/:id/start - Start the study and its process timer
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
) -> ApiResult<ApiResponse> {
    let session = state.start_process(study_id).await?;
    info!("Start endpoint called - study {} process timer running", study_id);
    Ok(Json(ApiResponse::ok("Process timer started", session)))
}

/// Handle POST /studies/:id/stop - Stop the process timer and save the study
pub async fn stop_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
    body: Result<Json<StopRequest>, JsonRejection>,
) -> ApiResult<ApiResponse> {
    let request = optional_body(body)?;
    let session = state.stop_and_save(study_id, request.notes).await?;
    let total = session.actual_total_seconds.map(format_hms).unwrap_or_default();
    info!("Stop endpoint called - study {} saved with {}", study_id, total);
    Ok(Json(ApiResponse::ok(
        format!("Time study completed, total time {}", total),
        session,
    )))
}

/// Handle POST /studies/:id/reset - Zero the process timer without saving
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
    body: Result<Json<ResetRequest>, JsonRejection>,
) -> ApiResult<ApiResponse> {
    let request = optional_body(body)?;
    let session = state.reset_process(study_id, request.confirm)?;
    Ok(Json(ApiResponse::ok("Process timer reset", session)))
}

/// Handle POST /studies/:id/scrap - Scrap the study with a reason
pub async fn scrap_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
    body: Result<Json<ScrapRequest>, JsonRejection>,
) -> ApiResult<ApiResponse> {
    let request = optional_body(body)?;
    let session = state.scrap(study_id, &request.notes).await?;
    info!("Scrap endpoint called - study {} scrapped", study_id);
    Ok(Json(ApiResponse::ok("Time study scrapped", session)))
}

/// Handle POST /studies/:id/steps/:step_id/start - Start a step timer
pub async fn step_start_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, step_id)): Path<(StudyId, StepId)>,
    body: Result<Json<StepStartRequest>, JsonRejection>,
) -> ApiResult<ApiResponse> {
    let request = optional_body(body)?;
    let session = state.start_step(study_id, step_id, request.confirm_re_time)?;
    Ok(Json(ApiResponse::ok(format!("Step {} started", step_id), session)))
}

/// Handle POST /studies/:id/steps/:step_id/stop - Stop and save a step timer
pub async fn step_stop_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, step_id)): Path<(StudyId, StepId)>,
) -> ApiResult<ApiResponse> {
    let step = state.stop_step(study_id, step_id).await?;
    let session = state.snapshot(study_id)?;
    let saved = step.actual_seconds.map(format_hms).unwrap_or_default();
    Ok(Json(ApiResponse::ok(
        format!("Step \"{}\" time saved: {}", step.name, saved),
        session,
    )))
}

/// Handle GET /studies/:id/export.csv - Download the study as CSV
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<StudyId>,
) -> Result<impl IntoResponse, TimerError> {
    let csv = state.export_csv(study_id)?;
    let disposition = format!("attachment; filename=\"time_study_{}.csv\"", study_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// Handle GET /status - Service status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();
    Ok(Json(StatusResponse {
        open_studies: state.open_studies()?,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
