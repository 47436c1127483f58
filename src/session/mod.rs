//! Conversation session management
//!
//! This module provides the `ConversationSession` orchestrator that manages:
//! - Channel lifecycle and the ready/start/stop handshake
//! - Microphone capture and outbound audio streaming
//! - Inbound audio playback in arrival order
//! - Live transcript assembly
//! - Observable status, error, speaker and amplitude state

mod driver;
mod session;
mod state;
mod stats;
mod transcript;

pub use session::{ConversationSession, SessionDevices};
pub use state::{SessionStatus, SessionSubscription};
pub use stats::SessionStats;
pub use transcript::{Participant, TranscriptAggregator, TranscriptEntry};
