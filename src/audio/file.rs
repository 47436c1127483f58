use anyhow::{bail, Context, Result};
use hound::{WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{
    AudioFrame, AudioInput, AudioOutput, CaptureConstraints, DecodedAudio, DeviceSettings,
    DeviceStream,
};

/// Frame length the WAV microphone emits
const FILE_FRAME_MS: u64 = 20;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Unsupported WAV format: {} bits {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Microphone backed by a WAV file, streamed at real-time pace
pub struct WavFileInput {
    path: PathBuf,
    name: String,
}

impl WavFileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("wav-input:{}", path.display());
        Self { path, name }
    }
}

#[async_trait::async_trait]
impl AudioInput for WavFileInput {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<DeviceStream> {
        if let Some(device_id) = &constraints.device_id {
            debug!("{} ignores device id constraint '{}'", self.name, device_id);
        }

        let audio = AudioFile::open(&self.path)
            .with_context(|| format!("Failed to acquire {}", self.name))?;

        let settings = DeviceSettings {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        };

        let samples_per_frame = (audio.sample_rate as u64 * FILE_FRAME_MS / 1000) as usize
            * audio.channels.max(1) as usize;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(FILE_FRAME_MS));
            for (index, samples) in audio.samples.chunks(samples_per_frame.max(1)).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: samples.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms: index as u64 * FILE_FRAME_MS,
                };
                if tx.send(frame).await.is_err() {
                    debug!("WAV input receiver dropped, stopping");
                    return;
                }
            }
            info!("WAV input reached end of file: {}", audio.path);
        });

        Ok(DeviceStream {
            settings,
            frames: rx,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Speaker that appends agent audio to a WAV file.
///
/// With `realtime` set, `play` waits for the buffer's duration so chunks are
/// paced like a real output device.
pub struct WavFileOutput {
    path: PathBuf,
    name: String,
    sample_rate: u32,
    realtime: bool,
    writer: Mutex<Option<WavWriter<BufWriter<File>>>>,
}

impl WavFileOutput {
    pub fn create(path: impl Into<PathBuf>, sample_rate: u32, realtime: bool) -> Result<Self> {
        let path = path.into();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Writing agent audio to {} ({}Hz)", path.display(), sample_rate);

        Ok(Self {
            name: format!("wav-output:{}", path.display()),
            path,
            sample_rate,
            realtime,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the WAV header; later `play` calls become no-ops
    pub fn finish(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("WAV writer lock poisoned"))?
            .take();
        if let Some(writer) = writer {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AudioOutput for WavFileOutput {
    fn native_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn play(&self, audio: DecodedAudio) -> Result<()> {
        if audio.sample_rate != self.sample_rate {
            warn!(
                "Playing {}Hz audio on a {}Hz output",
                audio.sample_rate, self.sample_rate
            );
        }

        {
            let mut guard = self
                .writer
                .lock()
                .map_err(|_| anyhow::anyhow!("WAV writer lock poisoned"))?;
            if let Some(writer) = guard.as_mut() {
                for &sample in &audio.samples {
                    writer
                        .write_sample(sample)
                        .context("Failed to write sample to WAV")?;
                }
            }
        }

        if self.realtime {
            tokio::time::sleep(audio.duration()).await;
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for WavFileOutput {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.take() {
                if let Err(e) = writer.finalize() {
                    warn!("Failed to finalize WAV writer on drop: {}", e);
                }
            }
        }
    }
}
