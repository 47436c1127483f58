pub mod backend;
pub mod codec;
pub mod file;

pub use backend::{
    AudioFrame, AudioInput, AudioOutput, CaptureConstraints, DecodedAudio, DeviceSettings,
    DeviceStream,
};
pub use codec::AudioCodec;
pub use file::{AudioFile, WavFileInput, WavFileOutput};
