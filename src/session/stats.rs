use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::state::SessionStatus;

/// Statistics about a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier used in logs
    pub session_id: String,

    pub status: SessionStatus,

    /// Whether capture and playback are enabled by the user
    pub active: bool,

    /// When the current conversation connected
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Audio chunks sent to the remote agent
    pub chunks_sent: usize,

    /// Audio chunks received from the remote agent
    pub chunks_received: usize,

    /// Inbound chunks skipped because they failed to decode
    pub decode_failures: usize,

    /// Number of transcript entries so far
    pub transcript_entries: usize,
}

/// Counters the driver bumps while a conversation runs
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub chunks_sent: AtomicUsize,
    pub chunks_received: AtomicUsize,
    pub decode_failures: AtomicUsize,
}

impl SessionCounters {
    pub fn reset(&self) {
        self.chunks_sent.store(0, Ordering::SeqCst);
        self.chunks_received.store(0, Ordering::SeqCst);
        self.decode_failures.store(0, Ordering::SeqCst);
    }

    pub fn sent(&self) -> usize {
        self.chunks_sent.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> usize {
        self.chunks_received.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.decode_failures.load(Ordering::SeqCst)
    }
}
