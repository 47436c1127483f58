use crate::audio::DecodedAudio;

/// Normalised RMS amplitude (0.0 to 1.0) of a decoded buffer.
///
/// Published while a chunk plays so visualisers can draw a level meter.
pub fn rms_amplitude(audio: &DecodedAudio) -> f32 {
    if audio.samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = audio
        .samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    ((sum_squares / audio.samples.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}
