//! Inference for the DDSP vocoder
//!
//! This module provides the CLI-facing entry points:
//! - InferencePipeline: Per-file decode, features, synthesis, write
//! - PitchMode: Native or transposed F0
//! - batch: Path validation and single-file / directory driving

pub mod batch;
mod pipeline;
mod pitch;

pub use batch::{collect_wav_files, output_path_for, run, BatchRequest};
pub use pipeline::{InferencePipeline, InferenceResult, OutputPaths};
pub use pitch::{resolve_f0, semitone_ratio, shift_f0, PitchMode};
