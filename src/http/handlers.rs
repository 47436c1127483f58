use super::state::AppState;
use crate::error::SessionError;
use crate::playback::Speaker;
use crate::session::{SessionStats, TranscriptEntry};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub stats: SessionStats,
    pub speaker: Speaker,
    pub amplitude: f32,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_response(state: &AppState) -> StatusResponse {
    let session = &state.session;
    StatusResponse {
        stats: session.stats(),
        speaker: session.current_speaker(),
        amplitude: session.playback_amplitude(),
        error: session.error().map(|e| e.to_string()),
    }
}

fn error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::AlreadyStarted => StatusCode::CONFLICT,
        SessionError::Config(_) => StatusCode::BAD_REQUEST,
        SessionError::Unsupported | SessionError::DeviceUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SessionError::ReadyTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        SessionError::Transport(_) | SessionError::HandshakeRejected(_) => StatusCode::BAD_GATEWAY,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /conversation/start
/// Connect and wait until the conversation is live
pub async fn start_conversation(State(state): State<AppState>) -> impl IntoResponse {
    info!("Starting conversation: {}", state.session.id());

    match state.session.start().await {
        Ok(()) => (StatusCode::OK, Json(status_response(&state))).into_response(),
        Err(e) => {
            error!("Failed to start conversation: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: format!("Failed to start conversation: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /conversation/stop
/// End the conversation (no-op when nothing is running)
pub async fn stop_conversation(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping conversation: {}", state.session.id());
    state.session.stop().await;
    (StatusCode::OK, Json(status_response(&state)))
}

/// POST /conversation/toggle
/// Pause or resume capture and playback
pub async fn toggle_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.session.toggle_active().await;
    (StatusCode::OK, Json(ToggleResponse { active }))
}

/// GET /conversation/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(status_response(&state)))
}

/// GET /conversation/transcript
/// Transcript accumulated so far
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<TranscriptEntry> = state.session.transcript();
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
