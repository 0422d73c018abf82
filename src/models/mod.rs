//! Neural vocoder models
//!
//! - DDSP sinusoidal-plus-noise vocoder
//! - Checkpoint loading and weight diagnostics

pub mod checkpoint;
pub mod vocoder;

// Re-exports
pub use checkpoint::{load_model, CheckpointReport, ModelBundle};
pub use vocoder::{SinsVocoder, SynthesisOutput, VocoderModel};
