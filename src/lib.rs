pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCodec, AudioFrame, AudioInput, AudioOutput, CaptureConstraints, DecodedAudio,
    DeviceSettings, DeviceStream, WavFileInput, WavFileOutput,
};
pub use capture::{CaptureController, CaptureStatus};
pub use config::{AudioDeviceConfig, Config, ConversationConfig, DirectConfig, HostedConfig};
pub use error::{CodecError, ConfigError, SessionError, SessionResult};
pub use http::{create_router, AppState};
pub use playback::{PlaybackQueue, Speaker};
pub use protocol::{CapabilityProbe, Engine, InboundMessage, OutboundMessage};
pub use session::{
    ConversationSession, Participant, SessionDevices, SessionStats, SessionStatus,
    SessionSubscription, TranscriptEntry,
};
pub use transport::{ChannelEvent, ChannelHandle, Connector, WebSocketConnector};
