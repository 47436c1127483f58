use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Constraints passed to the microphone when it is acquired
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    /// Specific input device (None = system default)
    pub device_id: Option<String>,
    /// Ask the platform audio stack for echo cancellation
    pub echo_cancellation: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
        }
    }
}

/// Format the device actually delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A live microphone stream. Dropping it releases the device.
#[derive(Debug)]
pub struct DeviceStream {
    pub settings: DeviceSettings,
    pub frames: mpsc::Receiver<AudioFrame>,
}

/// Microphone capture backend.
///
/// Implementations:
/// - `WavFileInput`: streams a WAV file at real-time pace (headless runs)
/// - test fakes driven from a channel
#[async_trait::async_trait]
pub trait AudioInput: Send {
    /// Acquire the device. Errors here mean permission was denied or the
    /// device is missing and are fatal for the conversation.
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<DeviceStream>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Decoded audio ready for the speaker
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono i16 PCM samples
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Speaker backend
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Sample rate the output runs at when nothing overrides it
    fn native_sample_rate(&self) -> u32;

    /// Play one buffer; resolves once playback has completed
    async fn play(&self, audio: DecodedAudio) -> Result<()>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_duration() {
        let audio = DecodedAudio {
            samples: vec![0; 1600],
            sample_rate: 16000,
        };
        assert_eq!(audio.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_rate_duration() {
        let audio = DecodedAudio {
            samples: vec![0; 10],
            sample_rate: 0,
        };
        assert_eq!(audio.duration(), Duration::ZERO);
    }

    #[test]
    fn test_constraints_request_echo_cancellation() {
        let constraints = CaptureConstraints::default();
        assert!(constraints.echo_cancellation);
        assert!(constraints.device_id.is_none());
    }
}
