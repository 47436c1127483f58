use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::transcript::TranscriptEntry;
use crate::error::SessionError;
use crate::playback::Speaker;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

/// Read-only views of a session's observable state.
///
/// Each field is a `watch` receiver: `borrow()` for the current value,
/// `changed().await` to wait for the next update.
#[derive(Debug, Clone)]
pub struct SessionSubscription {
    pub status: watch::Receiver<SessionStatus>,
    pub error: watch::Receiver<Option<SessionError>>,
    pub transcript: watch::Receiver<Vec<TranscriptEntry>>,
    pub speaker: watch::Receiver<Speaker>,
    pub amplitude: watch::Receiver<f32>,
}

/// Write side of the observables. Only the session and its driver hold it.
#[derive(Debug)]
pub(crate) struct SessionObservers {
    status: watch::Sender<SessionStatus>,
    error: watch::Sender<Option<SessionError>>,
    transcript: watch::Sender<Vec<TranscriptEntry>>,
    speaker: watch::Sender<Speaker>,
    amplitude: watch::Sender<f32>,
}

impl SessionObservers {
    pub fn new() -> Self {
        Self {
            status: watch::Sender::new(SessionStatus::Idle),
            error: watch::Sender::new(None),
            transcript: watch::Sender::new(Vec::new()),
            speaker: watch::Sender::new(Speaker::None),
            amplitude: watch::Sender::new(0.0),
        }
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            status: self.status.subscribe(),
            error: self.error.subscribe(),
            transcript: self.transcript.subscribe(),
            speaker: self.speaker.subscribe(),
            amplitude: self.amplitude.subscribe(),
        }
    }

    pub fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }

    /// Record a fatal error. The error is stored before the status flips so
    /// anyone woken by the status change sees it.
    pub fn fail(&self, error: SessionError) {
        self.error.send_replace(Some(error));
        self.status.send_replace(SessionStatus::Error);
    }

    pub fn clear_error(&self) {
        self.error.send_replace(None);
    }

    pub fn set_transcript(&self, entries: Vec<TranscriptEntry>) {
        self.transcript.send_replace(entries);
    }

    pub fn set_speaker(&self, speaker: Speaker) {
        self.speaker.send_if_modified(|current| {
            if *current == speaker {
                false
            } else {
                *current = speaker;
                true
            }
        });
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude.send_replace(amplitude);
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.error.borrow().clone()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.borrow().clone()
    }

    pub fn speaker(&self) -> Speaker {
        *self.speaker.borrow()
    }

    pub fn amplitude(&self) -> f32 {
        *self.amplitude.borrow()
    }
}
