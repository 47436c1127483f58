//! Channel protocol
//!
//! JSON text frames tagged by `type`. The client waits for
//! `websocket_ready`, sends exactly one start variant, then streams
//! `websocket_audio` both ways until it sends `websocket_stop`.

pub mod handshake;
pub mod messages;

pub use handshake::{
    build_start_message, downsampling_factor, time_slice_ms, CapabilityProbe, Engine,
    NegotiatedFormats,
};
pub use messages::{
    AudioConfigStartMessage, AudioEncoding, AudioFormat, AudioMessage, InboundMessage,
    InputAudioConfig, OutboundMessage, StartMessage, TranscriptMessage,
};
