use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::messages::{
    AudioConfigStartMessage, AudioFormat, InputAudioConfig, OutboundMessage, StartMessage,
};
use crate::config::{ConversationConfig, DEFAULT_CHUNK_SIZE, DEFAULT_TIME_SLICE_MS};

/// Transcriber kind that needs the Safari downsampling workaround
const DEEPGRAM_TRANSCRIBER: &str = "transcriber_deepgram";

/// Host engine reported by the capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Chromium,
    Safari,
    Unsupported,
}

impl Engine {
    pub fn is_supported(self) -> bool {
        !matches!(self, Engine::Unsupported)
    }
}

/// Checks the host runtime's media support before a session starts
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> Engine;
}

/// A fixed engine is its own probe (used by config-driven hosts and tests)
impl CapabilityProbe for Engine {
    fn probe(&self) -> Engine {
        *self
    }
}

/// Input/output formats agreed for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormats {
    pub input: AudioFormat,
    pub output: AudioFormat,
}

/// Build the single handshake message for this session.
///
/// The full-service variant is only used when the hosted configuration
/// carries a credential plus transcriber, agent and synthesizer configs.
pub fn build_start_message(
    config: &ConversationConfig,
    formats: &NegotiatedFormats,
    engine: Engine,
) -> OutboundMessage {
    if let ConversationConfig::Hosted(hosted) = config {
        if let (Some(transcriber), Some(agent), Some(synthesizer)) =
            (&hosted.transcriber, &hosted.agent, &hosted.synthesizer)
        {
            if !hosted.api_key.trim().is_empty() {
                let mut transcriber_config = merge_format(transcriber, &formats.input);
                if engine == Engine::Safari && is_deepgram(&transcriber_config) {
                    info!("Safari engine with deepgram transcriber, forcing downsampling = 2");
                    if let Value::Object(map) = &mut transcriber_config {
                        map.insert("downsampling".to_string(), Value::from(2));
                    }
                }

                debug!("Selected full-service start variant");
                return OutboundMessage::Start(StartMessage {
                    transcriber_config,
                    agent_config: agent.clone(),
                    synthesizer_config: merge_format(synthesizer, &formats.output),
                    conversation_id: hosted.conversation_id.clone(),
                });
            }
        }
    }

    let stream = config.stream();
    debug!("Selected self-hosted audio config start variant");
    OutboundMessage::AudioConfigStart(AudioConfigStartMessage {
        input_audio_config: InputAudioConfig {
            sampling_rate: formats.input.sampling_rate,
            audio_encoding: formats.input.audio_encoding,
            chunk_size: stream.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            downsampling: stream.downsampling,
        },
        output_audio_config: formats.output,
        conversation_id: config.conversation_id().map(str::to_string),
        subscribe_transcript: stream.subscribe_transcript,
    })
}

/// Capture interval for a session that sent `start`.
///
/// Full-service sessions derive it from the transcriber's chunk size and
/// sampling rate, otherwise an explicit override wins, else the default.
pub fn time_slice_ms(config: &ConversationConfig, start: &OutboundMessage) -> u64 {
    if let OutboundMessage::Start(msg) = start {
        let chunk_size = msg
            .transcriber_config
            .get("chunkSize")
            .and_then(Value::as_u64)
            .unwrap_or(config.stream().chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE) as u64);
        let sampling_rate = msg
            .transcriber_config
            .get("samplingRate")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if sampling_rate > 0 {
            return ((1000 * chunk_size) as f64 / sampling_rate as f64).round() as u64;
        }
    }

    config
        .stream()
        .time_slice_ms
        .unwrap_or(DEFAULT_TIME_SLICE_MS)
}

/// Downsampling factor the capture side must apply, as advertised in `start`
pub fn downsampling_factor(start: &OutboundMessage) -> u32 {
    match start {
        OutboundMessage::Start(msg) => msg
            .transcriber_config
            .get("downsampling")
            .and_then(Value::as_u64)
            .map(|f| f.max(1) as u32)
            .unwrap_or(1),
        OutboundMessage::AudioConfigStart(msg) => {
            msg.input_audio_config.downsampling.unwrap_or(1).max(1)
        }
        _ => 1,
    }
}

fn is_deepgram(transcriber: &Value) -> bool {
    transcriber.get("type").and_then(Value::as_str) == Some(DEEPGRAM_TRANSCRIBER)
}

/// Copy a caller config object and add the negotiated format fields to it
fn merge_format(base: &Value, format: &AudioFormat) -> Value {
    let mut map = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    map.insert(
        "samplingRate".to_string(),
        Value::from(format.sampling_rate),
    );
    map.insert(
        "audioEncoding".to_string(),
        serde_json::to_value(format.audio_encoding).unwrap_or(Value::Null),
    );
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectConfig, HostedConfig, StreamOptions};
    use serde_json::json;

    fn formats() -> NegotiatedFormats {
        NegotiatedFormats {
            input: AudioFormat::linear16(48000),
            output: AudioFormat::linear16(24000),
        }
    }

    fn hosted_parts(transcriber: Value) -> HostedConfig {
        HostedConfig {
            api_key: "key".to_string(),
            transcriber: Some(transcriber),
            agent: Some(json!({"type": "agent_chat_gpt"})),
            synthesizer: Some(json!({"type": "synthesizer_azure"})),
            conversation_id: Some("conv-1".to_string()),
            ..Default::default()
        }
    }

    fn full_hosted(transcriber: Value) -> ConversationConfig {
        ConversationConfig::Hosted(hosted_parts(transcriber))
    }

    #[test]
    fn test_full_hosted_selects_start() {
        let msg = build_start_message(
            &full_hosted(json!({"type": "transcriber_deepgram", "chunkSize": 2048})),
            &formats(),
            Engine::Chromium,
        );
        match msg {
            OutboundMessage::Start(start) => {
                assert_eq!(start.transcriber_config["samplingRate"], 48000);
                assert_eq!(start.transcriber_config["audioEncoding"], "linear16");
                assert_eq!(start.synthesizer_config["samplingRate"], 24000);
                assert!(start.transcriber_config.get("downsampling").is_none());
                assert_eq!(start.conversation_id.as_deref(), Some("conv-1"));
            }
            other => panic!("expected websocket_start, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_part_selects_audio_config_start() {
        let missing = [
            ConversationConfig::Hosted(HostedConfig {
                transcriber: None,
                ..hosted_parts(json!({}))
            }),
            ConversationConfig::Hosted(HostedConfig {
                agent: None,
                ..hosted_parts(json!({}))
            }),
            ConversationConfig::Hosted(HostedConfig {
                synthesizer: None,
                ..hosted_parts(json!({}))
            }),
            ConversationConfig::Hosted(HostedConfig {
                api_key: String::new(),
                ..hosted_parts(json!({}))
            }),
            ConversationConfig::Direct(DirectConfig {
                backend_url: "ws://localhost:3000/conversation".to_string(),
                ..Default::default()
            }),
        ];

        for config in &missing {
            let msg = build_start_message(config, &formats(), Engine::Chromium);
            assert!(
                matches!(msg, OutboundMessage::AudioConfigStart(_)),
                "expected self-hosted variant for {:?}",
                config
            );
        }
    }

    #[test]
    fn test_audio_config_start_defaults() {
        let config = ConversationConfig::Direct(DirectConfig {
            backend_url: "ws://localhost:3000/conversation".to_string(),
            conversation_id: Some("abc".to_string()),
            stream: StreamOptions {
                downsampling: Some(3),
                subscribe_transcript: Some(true),
                ..Default::default()
            },
        });
        match build_start_message(&config, &formats(), Engine::Safari) {
            OutboundMessage::AudioConfigStart(msg) => {
                assert_eq!(msg.input_audio_config.chunk_size, DEFAULT_CHUNK_SIZE);
                assert_eq!(msg.input_audio_config.downsampling, Some(3));
                assert_eq!(msg.input_audio_config.sampling_rate, 48000);
                assert_eq!(msg.output_audio_config.sampling_rate, 24000);
                assert_eq!(msg.conversation_id.as_deref(), Some("abc"));
                assert_eq!(msg.subscribe_transcript, Some(true));
            }
            other => panic!("expected audio config start, got {:?}", other),
        }
    }

    #[test]
    fn test_safari_deepgram_forces_downsampling() {
        let config = full_hosted(json!({"type": "transcriber_deepgram", "downsampling": 4}));
        let msg = build_start_message(&config, &formats(), Engine::Safari);
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["transcriberConfig"]["downsampling"], 2);
        assert_eq!(downsampling_factor(&msg), 2);
    }

    #[test]
    fn test_downsampling_untouched_elsewhere() {
        let cases = [
            (json!({"type": "transcriber_deepgram", "downsampling": 4}), Engine::Chromium),
            (json!({"type": "transcriber_assembly_ai", "downsampling": 4}), Engine::Safari),
        ];
        for (transcriber, engine) in cases {
            let msg = build_start_message(&full_hosted(transcriber), &formats(), engine);
            let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert_eq!(json["transcriberConfig"]["downsampling"], 4);
        }

        let plain = full_hosted(json!({"type": "transcriber_deepgram"}));
        let msg = build_start_message(&plain, &formats(), Engine::Chromium);
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert!(json["transcriberConfig"].get("downsampling").is_none());
    }

    #[test]
    fn test_time_slice_full_service() {
        let config = full_hosted(json!({"type": "transcriber_deepgram", "chunkSize": 2048}));
        let msg = build_start_message(&config, &formats(), Engine::Chromium);
        // 1000 * 2048 / 48000 = 42.67
        assert_eq!(time_slice_ms(&config, &msg), 43);
    }

    #[test]
    fn test_time_slice_override_and_default() {
        let mut direct = DirectConfig {
            backend_url: "ws://localhost:3000/conversation".to_string(),
            ..Default::default()
        };
        let config = ConversationConfig::Direct(direct.clone());
        let msg = build_start_message(&config, &formats(), Engine::Chromium);
        assert_eq!(time_slice_ms(&config, &msg), DEFAULT_TIME_SLICE_MS);

        direct.stream.time_slice_ms = Some(100);
        let config = ConversationConfig::Direct(direct);
        assert_eq!(time_slice_ms(&config, &msg), 100);
    }
}
