//! # ddsp-infer
//!
//! Offline inference for a DDSP sinusoidal-plus-noise neural vocoder.
//!
//! ## Features
//!
//! - Mel / F0 / UV feature extraction from mono WAV
//! - Harmonic and filtered-noise synthesis driven by a Candle network
//! - Optional pitch transposition in semitones
//! - Single-file and directory batch processing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use ddsp_infer::{InferencePipeline, PitchMode};
//!
//! let pipeline = InferencePipeline::load("exp/model.safetensors", &Device::Cpu)?;
//! let result = pipeline.infer("voice.wav", "out/voice.wav", PitchMode::Shifted(3))?;
//! println!("{:?}", result.outputs.harmonic);
//! ```

#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod preprocess;

// Re-exports for convenience
pub use config::{ComputeDevice, ModelConfig};
pub use error::InferError;
pub use inference::{BatchRequest, InferencePipeline, InferenceResult, PitchMode};
pub use models::{load_model, ModelBundle, SynthesisOutput, VocoderModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
