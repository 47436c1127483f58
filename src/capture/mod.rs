//! Microphone capture
//!
//! The controller acquires the device once, emits one encoded chunk per
//! time slice while recording, and pauses by detaching its listener rather
//! than closing the device.

mod controller;

pub use controller::{CaptureController, CaptureStatus};
