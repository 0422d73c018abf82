//! Model configuration
//!
//! DDSP checkpoints ship with a `config.yaml` next to the weights. The `data`
//! section describes how features are extracted, the `model` section the
//! network shape.

use anyhow::{Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::error::InferError;

/// File name of the config expected next to a checkpoint
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Top-level model configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Feature extraction parameters
    #[serde(default)]
    pub data: DataConfig,
    /// Network parameters
    #[serde(default)]
    pub model: SinsConfig,
}

/// Audio and feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Input and output sampling rate
    pub sampling_rate: u32,
    /// Hop size in samples; one feature frame per block
    pub block_size: usize,
    /// STFT size for the mel extractor
    pub n_fft: usize,
    /// STFT window length
    pub win_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Lowest mel filter edge in Hz
    pub mel_fmin: f32,
    /// Highest mel filter edge in Hz (None = Nyquist)
    pub mel_fmax: Option<f32>,
    /// Lowest F0 accepted as voiced
    pub f0_min: f32,
    /// Highest F0 accepted as voiced
    pub f0_max: f32,
    /// Pitch analysis window in samples
    pub f0_window: usize,
    /// NSDF clarity required for a frame to count as voiced
    pub f0_threshold: f32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 44100,
            block_size: 512,
            n_fft: 2048,
            win_length: 2048,
            n_mels: 128,
            mel_fmin: 40.0,
            mel_fmax: Some(16000.0),
            f0_min: 65.0,
            f0_max: 800.0,
            f0_window: 2048,
            f0_threshold: 0.6,
        }
    }
}

/// Sinusoidal-plus-noise network parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinsConfig {
    /// Architecture name; only `Sins` is supported
    #[serde(rename = "type")]
    pub kind: String,
    /// Hidden channels of the conv stack
    pub hidden_dim: usize,
    /// Residual conv blocks after the input stack
    pub n_layers: usize,
    /// Number of harmonic oscillators
    pub n_harmonics: usize,
    /// Bands in the noise magnitude envelope
    pub n_mag_noise: usize,
    /// Seed for the noise generator
    pub noise_seed: u64,
}

impl Default for SinsConfig {
    fn default() -> Self {
        Self {
            kind: "Sins".to_string(),
            hidden_dim: 256,
            n_layers: 3,
            n_harmonics: 128,
            n_mag_noise: 80,
            noise_seed: 0,
        }
    }
}

impl ModelConfig {
    /// Load and validate a config from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model config: {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse model config: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config that sits next to a checkpoint file
    pub fn for_checkpoint<P: AsRef<Path>>(checkpoint: P) -> Result<Self> {
        let dir = checkpoint.as_ref().parent().unwrap_or(Path::new("."));
        Self::load(dir.join(CONFIG_FILE_NAME))
    }

    /// Reject configs the preprocessor or vocoder cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.data;
        let m = &self.model;
        let invalid = |msg: String| -> Result<()> { Err(InferError::InvalidConfig(msg).into()) };

        if !m.kind.eq_ignore_ascii_case("sins") {
            return invalid(format!("unsupported model type {:?}", m.kind));
        }
        if d.sampling_rate == 0 || d.block_size == 0 {
            return invalid("sampling_rate and block_size must be positive".into());
        }
        if d.win_length == 0 || d.win_length > d.n_fft {
            return invalid(format!(
                "win_length {} must be in 1..={} (n_fft)",
                d.win_length, d.n_fft
            ));
        }
        if d.n_mels == 0 || m.n_harmonics == 0 || m.n_mag_noise == 0 || m.hidden_dim == 0 {
            return invalid("n_mels, n_harmonics, n_mag_noise and hidden_dim must be positive".into());
        }
        if !(d.f0_min > 0.0 && d.f0_min < d.f0_max) {
            return invalid(format!("f0 range [{}, {}] is empty", d.f0_min, d.f0_max));
        }
        let longest_period = (d.sampling_rate as f32 / d.f0_min).ceil() as usize;
        if d.f0_window < 2 * longest_period {
            return invalid(format!(
                "f0_window {} cannot hold two periods of f0_min ({} samples)",
                d.f0_window,
                2 * longest_period
            ));
        }
        Ok(())
    }
}

/// Where the forward pass runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ComputeDevice {
    /// Run on the CPU
    #[default]
    Cpu,
    /// Run on the first CUDA device, falling back to CPU if none is present
    Cuda,
}

impl ComputeDevice {
    /// Resolve to a candle device
    pub fn resolve(self) -> Result<Device> {
        match self {
            ComputeDevice::Cpu => Ok(Device::Cpu),
            ComputeDevice::Cuda => {
                let device = Device::cuda_if_available(0)?;
                if device.is_cpu() {
                    warn!("CUDA requested but not available, running on CPU");
                }
                Ok(device)
            }
        }
    }
}
