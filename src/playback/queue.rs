use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Who is currently audible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    None,
    User,
    Agent,
}

/// An inbound audio payload waiting for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Arrival order within the conversation
    pub sequence: u64,
    /// Base64 payload as received
    pub payload: String,
}

/// FIFO of inbound audio with at most one chunk in playback.
///
/// The session driver is the only caller. `next_chunk` hands out the oldest
/// chunk and marks the queue busy; `complete` is the hook the driver calls
/// when the playback task reports that chunk finished.
#[derive(Debug)]
pub struct PlaybackQueue {
    pending: VecDeque<AudioChunk>,
    processing: bool,
    enabled: bool,
    speaker: Speaker,
    next_sequence: u64,
}

impl PlaybackQueue {
    pub fn new(enabled: bool) -> Self {
        Self {
            pending: VecDeque::new(),
            processing: false,
            enabled,
            speaker: Speaker::None,
            next_sequence: 0,
        }
    }

    pub fn enqueue(&mut self, payload: String) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push_back(AudioChunk { sequence, payload });
        debug!("Queued inbound chunk {} ({} pending)", sequence, self.pending.len());
        sequence
    }

    /// Take the oldest chunk if nothing is playing and draining is enabled
    pub fn next_chunk(&mut self) -> Option<AudioChunk> {
        if self.processing || !self.enabled {
            return None;
        }
        let chunk = self.pending.pop_front()?;
        self.processing = true;
        self.speaker = Speaker::Agent;
        Some(chunk)
    }

    /// The chunk handed out by `next_chunk` finished (or failed to decode)
    pub fn complete(&mut self) {
        self.processing = false;
        if self.pending.is_empty() {
            self.speaker = Speaker::User;
        }
    }

    /// Pause or resume draining. The backlog is kept either way.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Drop the backlog (session teardown)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.processing = false;
        self.speaker = Speaker::None;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn current_speaker(&self) -> Speaker {
        self.speaker
    }
}
