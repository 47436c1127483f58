use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{SessionObservers, SessionStatus};
use super::stats::SessionCounters;
use super::transcript::{Participant, TranscriptAggregator};
use crate::audio::{AudioCodec, AudioOutput};
use crate::capture::CaptureController;
use crate::error::SessionError;
use crate::playback::{rms_amplitude, PlaybackQueue, Speaker};
use crate::protocol::{AudioMessage, InboundMessage, OutboundMessage};
use crate::transport::{ChannelEvent, ChannelHandle};

/// Control requests from the public session surface
#[derive(Debug)]
pub(crate) enum Command {
    /// Apply the user-facing active flag; acknowledged once applied
    SetActive(bool, oneshot::Sender<()>),
    Stop,
}

enum Outcome {
    Stopped,
    Closed,
}

/// Everything the running conversation owns.
///
/// One task runs `Driver::run` per connected conversation. It is the only
/// writer of the channel, the playback queue and the transcript.
pub(crate) struct Driver {
    pub session_id: String,
    pub channel: ChannelHandle,
    pub capture: Option<CaptureController>,
    pub codec: AudioCodec,
    pub queue: PlaybackQueue,
    pub transcript: TranscriptAggregator,
    pub output: Arc<dyn AudioOutput>,
    pub observers: Arc<SessionObservers>,
    pub counters: Arc<SessionCounters>,
    pub commands: mpsc::Receiver<Command>,
}

impl Driver {
    /// Run until stopped or the channel closes; hands the capture controller
    /// back so the next conversation can reuse the open device.
    pub async fn run(mut self) -> Option<CaptureController> {
        let (completion_tx, mut completion_rx) = mpsc::channel::<u64>(4);
        let mut playback_task: Option<JoinHandle<()>> = None;
        let mut transport_error: Option<String> = None;

        info!("[{}] Conversation driver started", self.session_id);

        let outcome = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::SetActive(active, ack)) => {
                        self.set_active(active);
                        self.pump_playback(&completion_tx, &mut playback_task);
                        let _ = ack.send(());
                    }
                    Some(Command::Stop) | None => break Outcome::Stopped,
                },

                event = self.channel.recv() => match event {
                    Some(ChannelEvent::Message(text)) => {
                        self.handle_message(&text);
                        self.pump_playback(&completion_tx, &mut playback_task);
                    }
                    Some(ChannelEvent::Error(e)) => {
                        warn!("[{}] Transport error: {}", self.session_id, e);
                        transport_error = Some(e);
                    }
                    Some(ChannelEvent::Closed) | None => break Outcome::Closed,
                },

                Some(sequence) = completion_rx.recv() => {
                    debug!("[{}] Finished playing chunk {}", self.session_id, sequence);
                    self.queue.complete();
                    self.observers.set_speaker(self.queue.current_speaker());
                    self.pump_playback(&completion_tx, &mut playback_task);
                }

                chunk = next_capture_chunk(&mut self.capture) => match chunk {
                    Some(data) => {
                        if let Err(e) = self.channel.send(OutboundMessage::Audio(AudioMessage { data })).await {
                            warn!("[{}] Dropped outbound audio: {}", self.session_id, e);
                        } else {
                            self.counters.chunks_sent.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    None => warn!("[{}] Microphone ended, continuing listen-only", self.session_id),
                },
            }
        };

        if let Some(task) = playback_task.take() {
            task.abort();
        }
        self.teardown(outcome, transport_error).await
    }

    fn set_active(&mut self, active: bool) {
        info!(
            "[{}] Conversation {}",
            self.session_id,
            if active { "resumed" } else { "paused" }
        );
        if let Some(capture) = &mut self.capture {
            if active {
                capture.resume();
            } else {
                capture.pause();
            }
        }
        self.queue.set_enabled(active);
    }

    fn handle_message(&mut self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Audio(audio)) => {
                self.counters.chunks_received.fetch_add(1, Ordering::SeqCst);
                self.queue.enqueue(audio.data);
            }
            Ok(InboundMessage::Transcript(fragment)) => {
                let speaker = Participant::from_sender(&fragment.sender);
                self.transcript.push(speaker, &fragment.text);
                self.observers.set_transcript(self.transcript.snapshot());
            }
            Ok(InboundMessage::Ready) => {
                debug!("[{}] Ignoring repeated ready", self.session_id);
            }
            Ok(InboundMessage::Unknown) => {
                debug!("[{}] Ignoring unknown message: {}", self.session_id, text);
            }
            Err(e) => {
                warn!("[{}] Failed to parse inbound message: {}", self.session_id, e);
            }
        }
    }

    /// Start the next chunk if the queue allows it. Chunks that fail to
    /// decode are skipped.
    fn pump_playback(
        &mut self,
        completion_tx: &mpsc::Sender<u64>,
        playback_task: &mut Option<JoinHandle<()>>,
    ) {
        while let Some(chunk) = self.queue.next_chunk() {
            let audio = match self.codec.decode(&chunk.payload) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("[{}] Skipping inbound chunk {}: {}", self.session_id, chunk.sequence, e);
                    self.counters.decode_failures.fetch_add(1, Ordering::SeqCst);
                    self.queue.complete();
                    continue;
                }
            };

            self.observers.set_speaker(self.queue.current_speaker());
            self.observers.set_amplitude(rms_amplitude(&audio));

            let output = Arc::clone(&self.output);
            let completion_tx = completion_tx.clone();
            let session_id = self.session_id.clone();
            let sequence = chunk.sequence;
            *playback_task = Some(tokio::spawn(async move {
                if let Err(e) = output.play(audio).await {
                    error!("[{}] Playback of chunk {} failed: {}", session_id, sequence, e);
                }
                let _ = completion_tx.send(sequence).await;
            }));
            return;
        }

        if !self.queue.is_processing() {
            self.observers.set_amplitude(0.0);
        }
        self.observers.set_speaker(self.queue.current_speaker());
    }

    async fn teardown(
        mut self,
        outcome: Outcome,
        transport_error: Option<String>,
    ) -> Option<CaptureController> {
        if let Some(capture) = &mut self.capture {
            capture.pause();
        }

        self.queue.clear();
        self.observers.set_speaker(Speaker::None);
        self.observers.set_amplitude(0.0);

        match outcome {
            Outcome::Stopped => {
                if self.channel.is_writable() {
                    if let Err(e) = self.channel.send(OutboundMessage::Stop).await {
                        debug!("[{}] Could not send stop: {}", self.session_id, e);
                    }
                }
                self.channel.close();
                self.observers.set_status(SessionStatus::Idle);
                info!("[{}] Conversation stopped", self.session_id);
            }
            Outcome::Closed => {
                self.channel.close();
                match transport_error {
                    Some(e) => {
                        error!("[{}] Channel closed after transport error: {}", self.session_id, e);
                        self.observers.fail(SessionError::Transport(e));
                    }
                    None => {
                        info!("[{}] Channel closed by remote", self.session_id);
                        self.observers.set_status(SessionStatus::Idle);
                    }
                }
            }
        }

        self.capture
    }
}

async fn next_capture_chunk(capture: &mut Option<CaptureController>) -> Option<String> {
    match capture {
        Some(capture) => capture.next_chunk().await,
        None => std::future::pending().await,
    }
}
