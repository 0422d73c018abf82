//! Checkpoint loading with weight diagnostics
//!
//! A DDSP checkpoint is a safetensors file with `config.yaml` beside it.
//! Before building the network, the tensor names in the file are compared
//! against what the architecture reads, so a mismatched checkpoint fails with
//! a list of missing tensors instead of a bare lookup error.

use anyhow::{Context, Result};
use candle_core::{safetensors::MmapedSafetensors, Device};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::vocoder::{SinsNetwork, SinsVocoder, VocoderModel};
use crate::config::ModelConfig;
use crate::error::InferError;

/// Expected vs. available tensors of a checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointReport {
    /// Path to the safetensors file
    pub file_path: PathBuf,
    /// All keys available in the file
    pub available_keys: Vec<String>,
    /// Keys the architecture reads
    pub expected_keys: HashSet<String>,
    /// Keys that were found (intersection)
    pub found_keys: HashSet<String>,
    /// Keys that were expected but missing
    pub missing_keys: HashSet<String>,
    /// Keys in file but not expected (extra/unused)
    pub extra_keys: HashSet<String>,
}

impl CheckpointReport {
    /// Compare the keys of a file with the expected set
    pub fn new(file_path: PathBuf, available_keys: Vec<String>, expected_keys: HashSet<String>) -> Self {
        let available_set: HashSet<String> = available_keys.iter().cloned().collect();

        let found_keys: HashSet<String> = expected_keys.intersection(&available_set).cloned().collect();
        let missing_keys: HashSet<String> = expected_keys.difference(&found_keys).cloned().collect();
        let extra_keys: HashSet<String> = available_set.difference(&expected_keys).cloned().collect();

        Self {
            file_path,
            available_keys,
            expected_keys,
            found_keys,
            missing_keys,
            extra_keys,
        }
    }

    /// Read the tensor names of a safetensors file
    pub fn inspect<P: AsRef<Path>>(path: P, expected_keys: HashSet<String>) -> Result<Self> {
        let path = path.as_ref();
        let tensors = unsafe { MmapedSafetensors::new(path) }
            .with_context(|| format!("Failed to open checkpoint: {:?}", path))?;
        let available_keys: Vec<String> = tensors.tensors().into_iter().map(|(name, _)| name).collect();
        Ok(Self::new(path.to_path_buf(), available_keys, expected_keys))
    }

    /// Calculate the ratio of found keys to expected keys
    pub fn success_rate(&self) -> f32 {
        if self.expected_keys.is_empty() {
            return 1.0;
        }
        self.found_keys.len() as f32 / self.expected_keys.len() as f32
    }

    /// Check that nothing the architecture needs is missing
    pub fn is_complete(&self) -> bool {
        self.missing_keys.is_empty()
    }

    /// Missing keys in a stable order
    pub fn missing_sorted(&self) -> Vec<String> {
        let mut missing: Vec<String> = self.missing_keys.iter().cloned().collect();
        missing.sort();
        missing
    }

    /// Log a summary of the checkpoint's contents
    pub fn log_summary(&self) {
        debug!(
            "Checkpoint {:?}: {} tensors available, {} expected, {} found",
            self.file_path,
            self.available_keys.len(),
            self.expected_keys.len(),
            self.found_keys.len()
        );
        if !self.extra_keys.is_empty() {
            debug!("  {} unused tensors in checkpoint", self.extra_keys.len());
        }
        if !self.is_complete() {
            warn!(
                "Checkpoint {:?} loaded {:.0}% of expected tensors",
                self.file_path,
                self.success_rate() * 100.0
            );
            for key in self.missing_sorted().iter().take(10) {
                warn!("  missing: {}", key);
            }
            if self.missing_keys.len() > 10 {
                warn!("  ... and {} more", self.missing_keys.len() - 10);
            }
        }
    }
}

/// A loaded model and the config it was trained with
pub struct ModelBundle {
    /// The vocoder
    pub model: Box<dyn VocoderModel>,
    /// Model configuration
    pub config: ModelConfig,
}

impl ModelBundle {
    /// Pair a model with its config
    pub fn new(model: Box<dyn VocoderModel>, config: ModelConfig) -> Self {
        Self { model, config }
    }

    /// Sampling rate the model consumes and produces
    pub fn sample_rate(&self) -> u32 {
        self.config.data.sampling_rate
    }
}

/// Load a checkpoint and the `config.yaml` next to it
pub fn load_model<P: AsRef<Path>>(path: P, device: &Device) -> Result<ModelBundle> {
    let path = path.as_ref();
    let config = ModelConfig::for_checkpoint(path)?;

    let expected: HashSet<String> = SinsNetwork::expected_keys(&config).into_iter().collect();
    let report = CheckpointReport::inspect(path, expected)?;
    report.log_summary();
    if !report.is_complete() {
        return Err(InferError::MissingWeights {
            path: path.to_path_buf(),
            missing: report.missing_sorted(),
        }
        .into());
    }

    let vocoder = SinsVocoder::load(path, config.clone(), device)
        .with_context(|| format!("Failed to build vocoder from {:?}", path))?;
    info!(
        "Loaded {} vocoder: {} Hz, block {}, {} harmonics",
        config.model.kind, config.data.sampling_rate, config.data.block_size, config.model.n_harmonics
    );

    Ok(ModelBundle::new(Box::new(vocoder), config))
}
