use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ConfigError;
use crate::protocol::Engine;

/// Hosted platform host used when no base url is configured
pub const DEFAULT_BASE_URL: &str = "api.vocode.dev";

/// Chunk size advertised in the self-hosted handshake when none is configured
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Capture interval used when nothing else determines it
pub const DEFAULT_TIME_SLICE_MS: u64 = 10;

pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Top-level file configuration for the `voice-session` binary
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub audio: AudioDeviceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Load from a config file (any format the `config` crate understands)
    /// layered with `VOICE_SESSION__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOICE_SESSION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Failed to deserialize config")?;
        cfg.conversation.validate()?;

        Ok(cfg)
    }
}

/// How to reach the conversation service.
///
/// The caller picks the kind up front. `Hosted` talks to the hosted platform
/// with an api key; `Direct` talks to a self-hosted endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationConfig {
    Hosted(HostedConfig),
    Direct(DirectConfig),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostedConfig {
    /// Opaque session credential
    pub api_key: String,
    /// Host (without scheme) of the hosted platform
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "json_blob")]
    pub transcriber: Option<Value>,
    #[serde(default, deserialize_with = "json_blob")]
    pub agent: Option<Value>,
    #[serde(default, deserialize_with = "json_blob")]
    pub synthesizer: Option<Value>,
    #[serde(default)]
    pub stream: StreamOptions,
}

/// Platform configs may be given inline or as a JSON string. Config files
/// lose key case on load, so camelCase platform fields must use the string form.
fn json_blob<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(raw)) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        other => Ok(other),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectConfig {
    /// Full `ws://` or `wss://` url of the conversation endpoint
    pub backend_url: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: StreamOptions,
}

/// Streaming knobs used by the self-hosted handshake and the capture loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub downsampling: Option<u32>,
    #[serde(default)]
    pub subscribe_transcript: Option<bool>,
    /// Explicit capture interval override in milliseconds
    #[serde(default)]
    pub time_slice_ms: Option<u64>,
}

impl ConversationConfig {
    /// Reject configurations that can never open a channel
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(0) = self.stream().downsampling {
            return Err(ConfigError::InvalidAudio(
                "downsampling factor must be at least 1".to_string(),
            ));
        }
        if let Some(0) = self.stream().chunk_size {
            return Err(ConfigError::InvalidAudio(
                "chunk size must be positive".to_string(),
            ));
        }
        self.endpoint().map(|_| ())
    }

    /// Resolve the channel endpoint
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let (raw, key) = match self {
            ConversationConfig::Hosted(hosted) => {
                if hosted.api_key.trim().is_empty() {
                    return Err(ConfigError::MissingApiKey);
                }
                let base = hosted.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
                (format!("wss://{}/conversation", base), Some(&hosted.api_key))
            }
            ConversationConfig::Direct(direct) => (direct.backend_url.clone(), None),
        };

        let mut url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if let Some(key) = key {
            url.query_pairs_mut().append_pair("key", key);
        }

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::InvalidUrl {
                url: raw,
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }

    pub fn stream(&self) -> &StreamOptions {
        match self {
            ConversationConfig::Hosted(hosted) => &hosted.stream,
            ConversationConfig::Direct(direct) => &direct.stream,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ConversationConfig::Hosted(hosted) => hosted.conversation_id.as_deref(),
            ConversationConfig::Direct(direct) => direct.conversation_id.as_deref(),
        }
    }
}

/// Audio device selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceConfig {
    /// Microphone to capture from (None = system default)
    #[serde(default)]
    pub input_device_id: Option<String>,
    /// Forces the negotiated output sampling rate
    #[serde(default)]
    pub output_sampling_rate: Option<u32>,
    /// Listen-only sessions never touch the microphone
    #[serde(default = "default_true")]
    pub use_microphone: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AudioDeviceConfig {
    fn default() -> Self {
        Self {
            input_device_id: None,
            output_sampling_rate: None,
            use_microphone: true,
        }
    }
}

/// Host runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Result reported by the capability probe
    #[serde(default = "default_engine")]
    pub engine: Engine,
    /// How long to wait for the remote side to signal ready
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
}

fn default_engine() -> Engine {
    Engine::Chromium
}

fn default_ready_timeout() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosted(api_key: &str) -> ConversationConfig {
        ConversationConfig::Hosted(HostedConfig {
            api_key: api_key.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_hosted_endpoint_uses_default_base() {
        let url = hosted("secret").endpoint().unwrap();
        assert_eq!(url.as_str(), "wss://api.vocode.dev/conversation?key=secret");
    }

    #[test]
    fn test_hosted_endpoint_custom_base() {
        let cfg = ConversationConfig::Hosted(HostedConfig {
            api_key: "k".to_string(),
            base_url: Some("voice.example.com".to_string()),
            ..Default::default()
        });
        assert_eq!(
            cfg.endpoint().unwrap().as_str(),
            "wss://voice.example.com/conversation?key=k"
        );
    }

    #[test]
    fn test_hosted_requires_api_key() {
        assert_eq!(hosted("  ").validate(), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn test_direct_rejects_http_scheme() {
        let cfg = ConversationConfig::Direct(DirectConfig {
            backend_url: "http://localhost:3000/conversation".to_string(),
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_direct_rejects_zero_downsampling() {
        let cfg = ConversationConfig::Direct(DirectConfig {
            backend_url: "ws://localhost:3000/conversation".to_string(),
            stream: StreamOptions {
                downsampling: Some(0),
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAudio(_))));
    }

    #[test]
    fn test_tagged_deserialization() {
        let json = r#"{
            "kind": "direct",
            "backend_url": "ws://localhost:3000/conversation",
            "stream": { "chunk_size": 1024, "subscribe_transcript": true }
        }"#;
        let cfg: ConversationConfig = serde_json::from_str(json).unwrap();
        match cfg {
            ConversationConfig::Direct(direct) => {
                assert_eq!(direct.stream.chunk_size, Some(1024));
                assert_eq!(direct.stream.subscribe_transcript, Some(true));
            }
            other => panic!("expected direct config, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
[conversation]
kind = "hosted"
api_key = "secret"

[runtime]
engine = "safari"
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert!(matches!(cfg.conversation, ConversationConfig::Hosted(_)));
        assert_eq!(cfg.runtime.engine, Engine::Safari);
        assert_eq!(cfg.runtime.ready_timeout_ms, DEFAULT_READY_TIMEOUT_MS);
        assert_eq!(cfg.http.port, 8088);
        assert!(cfg.audio.use_microphone);
    }

    #[test]
    fn test_load_rejects_invalid_conversation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "[conversation]\nkind = \"hosted\"\napi_key = \"\"\n").unwrap();

        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_platform_config_from_json_string() {
        let json = r#"{
            "kind": "hosted",
            "api_key": "k",
            "transcriber": "{\"type\": \"transcriber_deepgram\", \"chunkSize\": 2048}"
        }"#;
        let cfg: ConversationConfig = serde_json::from_str(json).unwrap();
        let ConversationConfig::Hosted(hosted) = cfg else {
            panic!("expected hosted config");
        };
        let transcriber = hosted.transcriber.unwrap();
        assert_eq!(transcriber["chunkSize"], 2048);
        assert!(hosted.agent.is_none());
    }

    #[test]
    fn test_api_key_is_query_encoded() {
        let url = hosted("a&b#c+d").endpoint().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("key".to_string(), "a&b#c+d".to_string())]);
        assert_eq!(url.path(), "/conversation");
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_microphone_enabled_without_audio_table() {
        assert!(AudioDeviceConfig::default().use_microphone);

        let cfg: Config = serde_json::from_str(
            r#"{"conversation": {"kind": "direct", "backend_url": "ws://localhost:3000/conversation"}}"#,
        )
        .unwrap();
        assert!(cfg.audio.use_microphone);
    }
}
