use thiserror::Error;

/// Fatal failures that end a conversation session.
///
/// Every variant moves the session into the `error` status; the message is
/// what the host application shows through the error observable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Capability probe found neither supported engine
    #[error("Unsupported runtime: voice conversation requires a Chromium or Safari engine")]
    Unsupported,

    /// Microphone could not be acquired (permission denied, no device)
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Channel failed to open or failed mid-session
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote side never signalled ready
    #[error("Timed out after {0}ms waiting for the conversation to become ready")]
    ReadyTimeout(u64),

    /// Remote side closed or rejected the channel before the handshake completed
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A channel is already live for this session
    #[error("Conversation already started")]
    AlreadyStarted,

    /// Configuration could not be used
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Caller misuse detected before any channel is opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Hosted configuration requires a non-empty api key")]
    MissingApiKey,

    #[error("Invalid backend url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid audio setting: {0}")]
    InvalidAudio(String),
}

/// Per-chunk audio failures. Logged and skipped, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed base64 payload: {0}")]
    Base64(String),

    #[error("Odd-length linear16 payload ({0} bytes)")]
    OddLength(usize),

    #[error("Downsampling factor must be at least 1")]
    ZeroDownsampling,
}

pub type SessionResult<T> = Result<T, SessionError>;
