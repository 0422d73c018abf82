//! Audio processing modules
//!
//! - WAV decoding at the file's native rate, downmixed to mono
//! - 32-bit float WAV output
//! - Log-magnitude mel spectrogram

mod loader;
mod mel;
mod output;

pub use loader::{AudioLoader, Waveform};
pub use mel::MelSpectrogram;
pub use output::AudioOutput;
