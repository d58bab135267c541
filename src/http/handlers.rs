use super::state::AppState;
use crate::session::{Party, SessionSnapshot, StartOutcome, StartRequest};
use crate::settings::{PartySettings, PartySettingsUpdate};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    /// Party to record for (defaults to the current mode)
    pub mode: Option<Party>,

    /// Countdown override in seconds
    pub countdown_secs: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartRecordingResponse {
    pub status: String,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopRecordingResponse {
    /// Whether this request ended a recording
    pub stopped: bool,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /record/start
/// Start a recording for the requested (or current) party.
/// A request without a JSON body records for the current mode.
pub async fn start_recording(
    State(state): State<AppState>,
    body: Result<Json<StartRecordingRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => StartRecordingRequest::default(),
        Err(rejection) => {
            warn!("Rejected start request: {}", rejection.body_text());
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    let request = StartRequest {
        mode: req.mode,
        countdown_secs: req.countdown_secs,
    };

    match state.controller.start(request).await {
        Ok(StartOutcome::Started) => {
            let snapshot = state.controller.snapshot();
            info!("Recording started for {}", snapshot.mode);
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    status: "recording".to_string(),
                    snapshot,
                }),
            )
                .into_response()
        }
        Ok(StartOutcome::AlreadyActive) => error_response(
            StatusCode::CONFLICT,
            "A recording is already in progress".to_string(),
        ),
        Ok(StartOutcome::Unavailable(reason)) => {
            warn!("Start request failed: {}", reason);
            error_response(StatusCode::SERVICE_UNAVAILABLE, reason)
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /record/stop
/// Stop the current recording; a no-op when nothing is recording
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Ok(stopped) => (
            StatusCode::OK,
            Json(StopRecordingResponse {
                stopped,
                snapshot: state.controller.snapshot(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /record/status
pub async fn recording_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.controller.snapshot())
}

/// GET /settings/:mode
pub async fn get_settings(
    State(state): State<AppState>,
    Path(mode): Path<Party>,
) -> Json<PartySettings> {
    Json(state.settings.get(mode))
}

/// PUT /settings/:mode
/// Merge the given fields into a party's settings
pub async fn update_settings(
    State(state): State<AppState>,
    Path(mode): Path<Party>,
    Json(update): Json<PartySettingsUpdate>,
) -> Json<PartySettings> {
    Json(state.settings.update(mode, update))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
