use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::driver::{Command, Driver};
use super::state::{SessionObservers, SessionStatus, SessionSubscription};
use super::stats::{SessionCounters, SessionStats};
use super::transcript::{TranscriptAggregator, TranscriptEntry};
use crate::audio::{AudioCodec, AudioInput, AudioOutput};
use crate::capture::CaptureController;
use crate::config::{AudioDeviceConfig, ConversationConfig, RuntimeConfig};
use crate::error::{SessionError, SessionResult};
use crate::playback::{PlaybackQueue, Speaker};
use crate::protocol::{
    build_start_message, downsampling_factor, time_slice_ms, AudioFormat, CapabilityProbe,
    InboundMessage, NegotiatedFormats, OutboundMessage,
};
use crate::transport::{ChannelEvent, ChannelHandle, Connector};

/// External collaborators a session talks to
pub struct SessionDevices {
    /// Microphone; `None` for listen-only sessions
    pub input: Option<Box<dyn AudioInput>>,
    pub output: Arc<dyn AudioOutput>,
    pub connector: Arc<dyn Connector>,
    pub probe: Arc<dyn CapabilityProbe>,
}

struct RunningDriver {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Option<CaptureController>>,
}

/// Why the ready wait ended without a ready message
enum WaitFailure {
    Fatal(SessionError),
    Cancelled,
}

/// A voice conversation with a remote agent.
///
/// `start`, `stop` and `toggle_active` are the only mutating calls. All
/// other state is observed through `subscribe` or the snapshot getters.
pub struct ConversationSession {
    session_id: String,
    config: ConversationConfig,
    audio: AudioDeviceConfig,
    ready_timeout: Duration,
    output: Arc<dyn AudioOutput>,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn CapabilityProbe>,

    /// Capture controller while no conversation is running
    capture: Mutex<Option<CaptureController>>,
    driver: Mutex<Option<RunningDriver>>,
    starting: AtomicBool,
    cancel_start: std::sync::Mutex<Option<oneshot::Sender<()>>>,

    active: Arc<AtomicBool>,
    observers: Arc<SessionObservers>,
    counters: Arc<SessionCounters>,
    started_at: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl ConversationSession {
    pub fn new(
        config: ConversationConfig,
        audio: AudioDeviceConfig,
        runtime: RuntimeConfig,
        devices: SessionDevices,
    ) -> Self {
        let session_id = format!("conversation-{}", uuid::Uuid::new_v4());
        info!("Creating conversation session: {}", session_id);

        let capture = if audio.use_microphone {
            devices
                .input
                .map(|input| CaptureController::new(input, audio.input_device_id.clone()))
        } else {
            None
        };

        Self {
            session_id,
            config,
            audio,
            ready_timeout: Duration::from_millis(runtime.ready_timeout_ms),
            output: devices.output,
            connector: devices.connector,
            probe: devices.probe,
            capture: Mutex::new(capture),
            driver: Mutex::new(None),
            starting: AtomicBool::new(false),
            cancel_start: std::sync::Mutex::new(None),
            active: Arc::new(AtomicBool::new(true)),
            observers: Arc::new(SessionObservers::new()),
            counters: Arc::new(SessionCounters::default()),
            started_at: std::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Open the channel, complete the handshake and start streaming.
    ///
    /// Resolves once the session is `connected` (or failed). Fatal failures
    /// are also published through the error observable.
    pub async fn start(&self) -> SessionResult<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut cancel = self
                .cancel_start
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if self.starting.load(Ordering::SeqCst) {
                warn!("[{}] Start already in progress", self.session_id);
                return Err(SessionError::AlreadyStarted);
            }
            self.starting.store(true, Ordering::SeqCst);
            *cancel = Some(cancel_tx);
        }

        let result = self.start_inner(cancel_rx).await;

        if let Ok(mut cancel) = self.cancel_start.lock() {
            cancel.take();
        }
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(&self, mut cancel_rx: oneshot::Receiver<()>) -> SessionResult<()> {
        {
            let mut driver = self.driver.lock().await;
            if let Some(running) = driver.as_ref() {
                if !running.task.is_finished() {
                    warn!("[{}] Conversation already running", self.session_id);
                    return Err(SessionError::AlreadyStarted);
                }
            }
            if let Some(finished) = driver.take() {
                self.reclaim_capture(finished.task).await;
            }
        }

        let url = self.config.endpoint()?;

        let engine = self.probe.probe();
        if !engine.is_supported() {
            error!("[{}] Capability probe failed: {:?}", self.session_id, engine);
            return Err(self.fail(SessionError::Unsupported));
        }

        self.observers.clear_error();
        self.observers.set_transcript(Vec::new());
        self.observers.set_speaker(Speaker::None);
        self.counters.reset();
        self.observers.set_status(SessionStatus::Connecting);
        info!("[{}] Connecting ({:?} engine)", self.session_id, engine);

        let mut channel = match self.connector.connect(&url).await {
            Ok(channel) => channel,
            Err(e) => return Err(self.fail(e)),
        };

        match self.wait_for_ready(&mut channel, &mut cancel_rx).await {
            Ok(()) => {}
            Err(WaitFailure::Cancelled) => {
                info!("[{}] Start cancelled before ready", self.session_id);
                channel.close();
                self.observers.set_status(SessionStatus::Idle);
                return Ok(());
            }
            Err(WaitFailure::Fatal(e)) => {
                channel.close();
                return Err(self.fail(e));
            }
        }
        info!("[{}] Remote side ready", self.session_id);

        let mut capture = self.capture.lock().await.take();
        let acquired = match capture.as_mut() {
            Some(controller) => Some(controller.acquire().await),
            None => None,
        };
        let device_settings = match acquired {
            Some(Ok(settings)) => Some(settings),
            Some(Err(e)) => {
                error!("[{}] Microphone acquisition failed: {:#}", self.session_id, e);
                *self.capture.lock().await = capture;
                channel.close();
                return Err(self.fail(SessionError::DeviceUnavailable(e.to_string())));
            }
            None => None,
        };

        let native_rate = self.output.native_sample_rate();
        let formats = NegotiatedFormats {
            input: AudioFormat::linear16(
                device_settings.map(|s| s.sample_rate).unwrap_or(native_rate),
            ),
            output: AudioFormat::linear16(self.audio.output_sampling_rate.unwrap_or(native_rate)),
        };

        let start_message = build_start_message(&self.config, &formats, engine);
        let slice_ms = time_slice_ms(&self.config, &start_message);
        let codec = match AudioCodec::new(
            formats.input,
            formats.output,
            downsampling_factor(&start_message),
        ) {
            Ok(codec) => codec,
            Err(e) => {
                *self.capture.lock().await = capture;
                channel.close();
                return Err(self.fail(SessionError::HandshakeRejected(e.to_string())));
            }
        };

        info!(
            "[{}] Sending {} (input {}Hz, output {}Hz)",
            self.session_id,
            start_message.kind(),
            formats.input.sampling_rate,
            formats.output.sampling_rate
        );
        if let Err(e) = channel.send(start_message).await {
            *self.capture.lock().await = capture;
            channel.close();
            return Err(self.fail(e));
        }

        let started = match capture.as_mut() {
            Some(controller) => Some(controller.start(codec, slice_ms).await),
            None => None,
        };
        match started {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                *self.capture.lock().await = capture;
                channel.close();
                return Err(self.fail(SessionError::DeviceUnavailable(e.to_string())));
            }
            None => info!("[{}] No microphone, listen-only mode", self.session_id),
        }

        // Held from the last cancel check until the driver is installed;
        // stop() and toggle_active() wait on it.
        let mut driver_slot = self.driver.lock().await;

        if cancel_rx.try_recv().is_ok() {
            drop(driver_slot);
            info!("[{}] Start cancelled during handshake", self.session_id);
            if let Some(controller) = capture.as_mut() {
                controller.pause();
            }
            *self.capture.lock().await = capture;
            let _ = channel.send(OutboundMessage::Stop).await;
            channel.close();
            self.observers.set_status(SessionStatus::Idle);
            return Ok(());
        }

        let active = self.active.load(Ordering::SeqCst);
        if !active {
            if let Some(controller) = capture.as_mut() {
                controller.pause();
            }
        }

        let (command_tx, command_rx) = mpsc::channel(16);
        let driver = Driver {
            session_id: self.session_id.clone(),
            channel,
            capture,
            codec,
            queue: PlaybackQueue::new(active),
            transcript: TranscriptAggregator::new(),
            output: Arc::clone(&self.output),
            observers: Arc::clone(&self.observers),
            counters: Arc::clone(&self.counters),
            commands: command_rx,
        };

        if let Ok(mut started_at) = self.started_at.lock() {
            *started_at = Some(Utc::now());
        }
        self.observers.set_status(SessionStatus::Connected);
        *driver_slot = Some(RunningDriver {
            commands: command_tx,
            task: tokio::spawn(driver.run()),
        });
        drop(driver_slot);

        info!("[{}] Conversation connected", self.session_id);
        Ok(())
    }

    async fn wait_for_ready(
        &self,
        channel: &mut ChannelHandle,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(), WaitFailure> {
        let deadline = tokio::time::sleep(self.ready_timeout);
        tokio::pin!(deadline);
        let mut transport_error: Option<String> = None;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("[{}] No ready signal after {:?}", self.session_id, self.ready_timeout);
                    return Err(WaitFailure::Fatal(SessionError::ReadyTimeout(
                        self.ready_timeout.as_millis() as u64,
                    )));
                }
                _ = &mut *cancel_rx => return Err(WaitFailure::Cancelled),
                event = channel.recv() => match event {
                    Some(ChannelEvent::Message(text)) => match InboundMessage::parse(&text) {
                        Ok(InboundMessage::Ready) => return Ok(()),
                        Ok(other) => debug!("[{}] Ignoring message before ready: {:?}", self.session_id, other),
                        Err(e) => warn!("[{}] Failed to parse message before ready: {}", self.session_id, e),
                    },
                    Some(ChannelEvent::Error(e)) => {
                        warn!("[{}] Transport error before ready: {}", self.session_id, e);
                        transport_error = Some(e);
                    }
                    Some(ChannelEvent::Closed) | None => {
                        let error = match transport_error.take() {
                            Some(e) => SessionError::Transport(e),
                            None => SessionError::HandshakeRejected(
                                "channel closed before ready".to_string(),
                            ),
                        };
                        return Err(WaitFailure::Fatal(error));
                    }
                },
            }
        }
    }

    /// End the conversation. Safe to call at any time, any number of times.
    pub async fn stop(&self) {
        let cancel = self.cancel_start.lock().ok().and_then(|mut c| c.take());
        if let Some(cancel) = cancel {
            debug!("[{}] Cancelling start in progress", self.session_id);
            let _ = cancel.send(());
        }

        let running = self.driver.lock().await.take();
        let Some(running) = running else {
            debug!("[{}] Stop with no running conversation", self.session_id);
            return;
        };

        let _ = running.commands.send(Command::Stop).await;
        self.reclaim_capture(running.task).await;
    }

    /// Flip the user-facing active flag: pauses or resumes capture and
    /// playback draining. Returns the new value.
    pub async fn toggle_active(&self) -> bool {
        let active = !self.active.fetch_xor(true, Ordering::SeqCst);
        info!("[{}] Active set to {}", self.session_id, active);

        let commands = self
            .driver
            .lock()
            .await
            .as_ref()
            .map(|running| running.commands.clone());
        if let Some(commands) = commands {
            let (ack_tx, ack_rx) = oneshot::channel();
            if commands.send(Command::SetActive(active, ack_tx)).await.is_ok() {
                let _ = ack_rx.await;
            }
        }
        active
    }

    pub fn subscribe(&self) -> SessionSubscription {
        self.observers.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.observers.status()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.observers.error()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.observers.transcript()
    }

    pub fn current_speaker(&self) -> Speaker {
        self.observers.speaker()
    }

    /// Amplitude of the chunk currently playing (0.0 to 1.0)
    pub fn playback_amplitude(&self) -> f32 {
        self.observers.amplitude()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = self.started_at.lock().ok().and_then(|s| *s);
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.session_id.clone(),
            status: self.status(),
            active: self.is_active(),
            started_at,
            duration_secs,
            chunks_sent: self.counters.sent(),
            chunks_received: self.counters.received(),
            decode_failures: self.counters.failures(),
            transcript_entries: self.observers.transcript().len(),
        }
    }

    async fn reclaim_capture(&self, task: JoinHandle<Option<CaptureController>>) {
        match task.await {
            Ok(capture) => {
                if capture.is_some() {
                    *self.capture.lock().await = capture;
                }
            }
            Err(e) => error!("[{}] Conversation driver panicked: {}", self.session_id, e),
        }
    }

    fn fail(&self, error: SessionError) -> SessionError {
        error!("[{}] Conversation failed: {}", self.session_id, error);
        self.observers.fail(error.clone());
        error
    }
}
