//! HTTP API server for the recorder UI
//!
//! This module exposes the start/stop controls and observable state:
//! - POST /record/start - Start a recording
//! - POST /record/stop - Stop the current recording
//! - GET /record/status - Current session snapshot
//! - GET|PUT /settings/:mode - Party language and voice preferences
//! - GET /health - Health check
//!
//! Recorded audio itself is never served.

mod handlers;
mod routes;
mod state;

pub use handlers::{StartRecordingRequest, StartRecordingResponse, StopRecordingResponse};
pub use routes::create_router;
pub use state::AppState;
