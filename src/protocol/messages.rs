use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sample encoding carried on the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM
    Linear16,
    /// G.711 mu-law, 8 bits per sample
    Mulaw,
}

/// Sample rate + encoding, fixed once sent in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sampling_rate: u32,
    pub audio_encoding: AudioEncoding,
}

impl AudioFormat {
    pub fn linear16(sampling_rate: u32) -> Self {
        Self {
            sampling_rate,
            audio_encoding: AudioEncoding::Linear16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAudioConfig {
    pub sampling_rate: u32,
    pub audio_encoding: AudioEncoding,
    pub chunk_size: usize,
    /// Decimation the client already applied to every audio payload.
    /// `sampling_rate` stays the device rate; the effective payload rate is
    /// `sampling_rate / downsampling`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsampling: Option<u32>,
}

/// Full-service handshake: transcriber, agent and synthesizer are configured
/// by the client and the negotiated formats are merged into them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    pub transcriber_config: Value,
    pub agent_config: Value,
    pub synthesizer_config: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Self-hosted handshake: only the audio formats are negotiated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfigStartMessage {
    pub input_audio_config: InputAudioConfig,
    pub output_audio_config: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_transcript: Option<bool>,
}

/// Base64 audio payload, used in both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMessage {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub sender: String,
    pub text: String,
}

/// Messages the client writes to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "websocket_start")]
    Start(StartMessage),
    #[serde(rename = "websocket_audio_config_start")]
    AudioConfigStart(AudioConfigStartMessage),
    #[serde(rename = "websocket_audio")]
    Audio(AudioMessage),
    #[serde(rename = "websocket_stop")]
    Stop,
}

impl OutboundMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// True for either handshake variant
    pub fn is_start_variant(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Start(_) | OutboundMessage::AudioConfigStart(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Start(_) => "websocket_start",
            OutboundMessage::AudioConfigStart(_) => "websocket_audio_config_start",
            OutboundMessage::Audio(_) => "websocket_audio",
            OutboundMessage::Stop => "websocket_stop",
        }
    }
}

/// Messages the remote side writes to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "websocket_ready")]
    Ready,
    #[serde(rename = "websocket_audio")]
    Audio(AudioMessage),
    #[serde(rename = "websocket_transcript")]
    Transcript(TranscriptMessage),
    /// Any message type this client does not handle
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stop_serialization() {
        let json = OutboundMessage::Stop.to_json().unwrap();
        assert_eq!(json, r#"{"type":"websocket_stop"}"#);
    }

    #[test]
    fn test_audio_config_start_shape() {
        let msg = OutboundMessage::AudioConfigStart(AudioConfigStartMessage {
            input_audio_config: InputAudioConfig {
                sampling_rate: 48000,
                audio_encoding: AudioEncoding::Linear16,
                chunk_size: 2048,
                downsampling: None,
            },
            output_audio_config: AudioFormat::linear16(24000),
            conversation_id: None,
            subscribe_transcript: Some(true),
        });

        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "websocket_audio_config_start",
                "inputAudioConfig": {
                    "samplingRate": 48000,
                    "audioEncoding": "linear16",
                    "chunkSize": 2048
                },
                "outputAudioConfig": {
                    "samplingRate": 24000,
                    "audioEncoding": "linear16"
                },
                "subscribeTranscript": true
            })
        );
    }

    #[test]
    fn test_parse_inbound_variants() {
        assert_eq!(
            InboundMessage::parse(r#"{"type":"websocket_ready"}"#).unwrap(),
            InboundMessage::Ready
        );

        let audio = InboundMessage::parse(r#"{"type":"websocket_audio","data":"AAE="}"#).unwrap();
        assert_eq!(
            audio,
            InboundMessage::Audio(AudioMessage {
                data: "AAE=".to_string()
            })
        );

        let transcript =
            InboundMessage::parse(r#"{"type":"websocket_transcript","sender":"bot","text":"hi"}"#)
                .unwrap();
        assert_eq!(
            transcript,
            InboundMessage::Transcript(TranscriptMessage {
                sender: "bot".to_string(),
                text: "hi".to_string()
            })
        );
    }

    #[test]
    fn test_parse_unknown_type() {
        let msg = InboundMessage::parse(r#"{"type":"websocket_something_new","x":1}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(InboundMessage::parse(r#"{"type":"websocket_audio"}"#).is_err());
        assert!(InboundMessage::parse("not json").is_err());
    }
}
