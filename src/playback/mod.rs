//! Inbound audio playback
//!
//! A single-consumer FIFO of synthesized speech plus the amplitude meter the
//! session publishes for visualisers.

mod meter;
mod queue;

pub use meter::rms_amplitude;
pub use queue::{AudioChunk, PlaybackQueue, Speaker};
