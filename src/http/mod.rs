//! HTTP API server for external control
//!
//! This module provides a REST API for driving the conversation session:
//! - POST /conversation/start - Connect and start streaming
//! - POST /conversation/stop - End the conversation
//! - POST /conversation/toggle - Pause or resume capture and playback
//! - GET /conversation/status - Query session status
//! - GET /conversation/transcript - Get the live transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
