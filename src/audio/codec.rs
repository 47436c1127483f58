//! PCM <-> channel payload conversion
//!
//! Outbound: interleaved i16 frames are mixed down to mono, decimated by the
//! negotiated downsampling factor, encoded as linear16 or mu-law bytes and
//! base64 framed. Inbound: base64 payloads are decoded back to mono i16 at
//! the negotiated output format.

use base64::Engine;

use super::backend::DecodedAudio;
use crate::error::CodecError;
use crate::protocol::{AudioEncoding, AudioFormat};

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCodec {
    input: AudioFormat,
    output: AudioFormat,
    downsampling: u32,
}

impl AudioCodec {
    pub fn new(input: AudioFormat, output: AudioFormat, downsampling: u32) -> Result<Self, CodecError> {
        if downsampling == 0 {
            return Err(CodecError::ZeroDownsampling);
        }
        Ok(Self {
            input,
            output,
            downsampling,
        })
    }

    pub fn input_format(&self) -> AudioFormat {
        self.input
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    pub fn downsampling(&self) -> u32 {
        self.downsampling
    }

    /// Encode captured samples into a base64 payload for `websocket_audio`
    pub fn encode(&self, samples: &[i16], channels: u16) -> String {
        let mono = to_mono(samples, channels);
        let decimated: Vec<i16> = if self.downsampling > 1 {
            mono.iter()
                .step_by(self.downsampling as usize)
                .copied()
                .collect()
        } else {
            mono
        };

        let bytes: Vec<u8> = match self.input.audio_encoding {
            AudioEncoding::Linear16 => decimated.iter().flat_map(|s| s.to_le_bytes()).collect(),
            AudioEncoding::Mulaw => decimated.iter().map(|&s| linear_to_mulaw(s)).collect(),
        };

        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Decode an inbound `websocket_audio` payload
    pub fn decode(&self, payload: &str) -> Result<DecodedAudio, CodecError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| CodecError::Base64(e.to_string()))?;

        let samples = match self.output.audio_encoding {
            AudioEncoding::Linear16 => {
                if bytes.len() % 2 != 0 {
                    return Err(CodecError::OddLength(bytes.len()));
                }
                bytes
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect()
            }
            AudioEncoding::Mulaw => bytes.iter().map(|&b| mulaw_to_linear(b)).collect(),
        };

        Ok(DecodedAudio {
            samples,
            sample_rate: self.output.sampling_rate,
        })
    }
}

/// Average interleaved channels into one
fn to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

fn linear_to_mulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

fn mulaw_to_linear(byte: u8) -> i16 {
    let value = !byte as i32;
    let sign = value & 0x80;
    let exponent = (value >> 4) & 0x07;
    let mantissa = value & 0x0F;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(encoding: AudioEncoding, downsampling: u32) -> AudioCodec {
        let format = AudioFormat {
            sampling_rate: 16000,
            audio_encoding: encoding,
        };
        AudioCodec::new(format, format, downsampling).unwrap()
    }

    #[test]
    fn test_linear16_encoding_is_little_endian() {
        let encoded = codec(AudioEncoding::Linear16, 1).encode(&[1, -2], 1);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn test_downsampling_decimates() {
        let c = codec(AudioEncoding::Linear16, 2);
        let decoded = c.decode(&c.encode(&[10, 11, 20, 21, 30, 31], 1)).unwrap();
        assert_eq!(decoded.samples, vec![10, 20, 30]);
    }

    #[test]
    fn test_stereo_mixdown() {
        let c = codec(AudioEncoding::Linear16, 1);
        let decoded = c.decode(&c.encode(&[100, 200, -50, 50], 2)).unwrap();
        assert_eq!(decoded.samples, vec![150, 0]);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        let err = codec(AudioEncoding::Linear16, 1).decode("@@not base64@@").unwrap_err();
        assert!(matches!(err, CodecError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let payload = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let err = codec(AudioEncoding::Linear16, 1).decode(&payload).unwrap_err();
        assert_eq!(err, CodecError::OddLength(3));
    }

    #[test]
    fn test_mulaw_is_close_to_source() {
        let c = codec(AudioEncoding::Mulaw, 1);
        let source = [0i16, 1000, -1000, 12000, -30000];
        let decoded = c.decode(&c.encode(&source, 1)).unwrap();
        for (original, restored) in source.iter().zip(decoded.samples.iter()) {
            let tolerance = (original.unsigned_abs() as i32 / 16).max(8);
            assert!(
                (*original as i32 - *restored as i32).abs() <= tolerance,
                "{} decoded as {}",
                original,
                restored
            );
        }
    }

    #[test]
    fn test_zero_downsampling_rejected() {
        let format = AudioFormat::linear16(16000);
        assert_eq!(
            AudioCodec::new(format, format, 0),
            Err(CodecError::ZeroDownsampling)
        );
    }
}
