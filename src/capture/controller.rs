use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioCodec, AudioFrame, AudioInput, CaptureConstraints, DeviceSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// No recorder yet, or one that was acquired but never started
    Inactive,
    /// Listener attached, chunks are emitted
    Recording,
    /// Device still open, frames are drained and dropped
    Paused,
}

/// Device stream plus the encoder state attached to it.
///
/// Created on first acquisition and reused for the lifetime of the
/// controller so the platform never prompts for the microphone twice.
struct Recorder {
    settings: DeviceSettings,
    frames: mpsc::Receiver<AudioFrame>,
    pending: Vec<i16>,
    ended: bool,
}

struct Encoder {
    codec: AudioCodec,
    samples_per_slice: usize,
}

/// Owns the microphone and turns its frames into fixed-interval chunks
pub struct CaptureController {
    input: Box<dyn AudioInput>,
    constraints: CaptureConstraints,
    recorder: Option<Recorder>,
    encoder: Option<Encoder>,
    status: CaptureStatus,
}

impl CaptureController {
    pub fn new(input: Box<dyn AudioInput>, device_id: Option<String>) -> Self {
        Self {
            input,
            constraints: CaptureConstraints {
                device_id,
                echo_cancellation: true,
            },
            recorder: None,
            encoder: None,
            status: CaptureStatus::Inactive,
        }
    }

    /// Open the device if it is not open yet and report its format
    pub async fn acquire(&mut self) -> Result<DeviceSettings> {
        if let Some(recorder) = &self.recorder {
            return Ok(recorder.settings);
        }

        info!("Acquiring microphone via {}", self.input.name());
        let stream = self.input.acquire(&self.constraints).await?;
        info!(
            "Microphone acquired: {}Hz, {} channels",
            stream.settings.sample_rate, stream.settings.channels
        );

        let settings = stream.settings;
        self.recorder = Some(Recorder {
            settings,
            frames: stream.frames,
            pending: Vec::new(),
            ended: false,
        });
        Ok(settings)
    }

    /// Start emitting chunks encoded with `codec` every `time_slice_ms`.
    ///
    /// No-op while already recording. A paused recorder is resumed with the
    /// new encoder settings instead of being reopened.
    pub async fn start(&mut self, codec: AudioCodec, time_slice_ms: u64) -> Result<()> {
        if self.status == CaptureStatus::Recording {
            debug!("Capture already recording, ignoring start");
            return Ok(());
        }

        let settings = self.acquire().await?;
        let samples_per_slice =
            ((settings.sample_rate as u64 * time_slice_ms.max(1)) / 1000).max(1) as usize
                * settings.channels.max(1) as usize;

        self.encoder = Some(Encoder {
            codec,
            samples_per_slice,
        });
        self.discard_buffered();
        self.status = CaptureStatus::Recording;

        info!(
            "Capture started: {}ms slices ({} samples)",
            time_slice_ms, samples_per_slice
        );
        Ok(())
    }

    /// Detach the listener without closing the device
    pub fn pause(&mut self) {
        if self.status != CaptureStatus::Recording {
            return;
        }
        self.status = CaptureStatus::Paused;
        if let Some(recorder) = &mut self.recorder {
            recorder.pending.clear();
        }
        debug!("Capture paused");
    }

    /// Reattach the listener after `pause`
    pub fn resume(&mut self) {
        if self.status != CaptureStatus::Paused || self.encoder.is_none() {
            return;
        }
        self.discard_buffered();
        self.status = CaptureStatus::Recording;
        debug!("Capture resumed");
    }

    /// Drop frames the device delivered while no listener was attached
    fn discard_buffered(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        recorder.pending.clear();

        let mut dropped = 0;
        while recorder.frames.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} frames captured while detached", dropped);
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == CaptureStatus::Recording
    }

    pub fn has_recorder(&self) -> bool {
        self.recorder.is_some()
    }

    /// Wait for the next encoded chunk.
    ///
    /// Cancel safe: partial slices are kept on the recorder between calls.
    /// Returns `None` once when the device stream ends; after that (and
    /// while there is no recorder) it never resolves.
    pub async fn next_chunk(&mut self) -> Option<String> {
        let Some(recorder) = self.recorder.as_mut() else {
            return std::future::pending().await;
        };
        if recorder.ended {
            return std::future::pending().await;
        }

        loop {
            let Some(frame) = recorder.frames.recv().await else {
                warn!("Microphone stream ended");
                recorder.ended = true;
                recorder.pending.clear();
                return None;
            };

            let encoder = match (&self.encoder, self.status) {
                (Some(encoder), CaptureStatus::Recording) => encoder,
                _ => continue,
            };

            recorder.pending.extend_from_slice(&frame.samples);
            if recorder.pending.len() >= encoder.samples_per_slice {
                let slice: Vec<i16> = recorder.pending.drain(..).collect();
                return Some(encoder.codec.encode(&slice, recorder.settings.channels));
            }
        }
    }
}
