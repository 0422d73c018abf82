//! Error taxonomy for inference runs
//!
//! Library functions return `anyhow::Result`; these variants are the typed
//! failures callers may want to match on via `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

/// Domain errors raised while validating paths, decoding audio or loading models
#[derive(Error, Debug)]
pub enum InferError {
    /// A path given on the command line does not exist
    #[error("path does not exist: {0:?}")]
    PathNotFound(PathBuf),

    /// A path exists but cannot be opened
    #[error("path is not readable: {path:?}: {source}")]
    NotReadable {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A file was required but a directory was given
    #[error("expected a file, found a directory: {0:?}")]
    NotAFile(PathBuf),

    /// Output target must be a directory
    #[error("output must be a directory: {0:?}")]
    OutputNotDirectory(PathBuf),

    /// Decoded audio is not at the model's sampling rate
    #[error("sample rate of input file {path:?} is {found} Hz, model expects {expected} Hz")]
    SampleRateMismatch {
        /// Offending input file
        path: PathBuf,
        /// Rate found in the file header
        found: u32,
        /// Rate from the model config
        expected: u32,
    },

    /// Mel, F0 and UV disagree on the number of frames
    #[error("feature length mismatch: mel has {mel_frames} frames, f0 {f0_len}, uv {uv_len}")]
    ShapeMismatch {
        /// Mel frames
        mel_frames: usize,
        /// F0 entries
        f0_len: usize,
        /// UV entries
        uv_len: usize,
    },

    /// Model inputs disagree on the number of frames
    #[error("model input mismatch: mel has {mel_frames} frames, f0 has {f0_frames}")]
    FrameMismatch {
        /// Frames in the mel tensor
        mel_frames: usize,
        /// Frames in the F0 tensor
        f0_frames: usize,
    },

    /// Input is not a WAV file
    #[error("unsupported audio format: {0:?}")]
    UnsupportedFormat(PathBuf),

    /// Checkpoint lacks tensors the architecture needs
    #[error("checkpoint {path:?} is missing {} tensors: {}", missing.len(), missing.join(", "))]
    MissingWeights {
        /// Checkpoint file
        path: PathBuf,
        /// Missing tensor names, sorted
        missing: Vec<String>,
    },

    /// Config parsed but describes an unusable model
    #[error("invalid model config: {0}")]
    InvalidConfig(String),
}
