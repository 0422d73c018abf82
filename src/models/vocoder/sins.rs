//! Sinusoidal-plus-noise DDSP vocoder
//!
//! The network predicts per-frame harmonic amplitudes and a noise magnitude
//! envelope from (mel, F0); the waveform is then rendered by an additive
//! oscillator bank and a filtered-noise generator.
//!
//! Architecture:
//! - Input mel (batch, frames, n_mels), F0 (batch, frames, 1)
//! - conv_in / conv_mid over the mel, plus a linear F0 embedding
//! - Residual conv blocks with pre-LayerNorm
//! - dense_out -> [n_harmonics | n_mag_noise], exponential sigmoid scaling

use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, LayerNorm, Linear, Module, VarBuilder};
use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;
use tracing::debug;

use super::synth::{HarmonicSynth, NoiseSynth};
use super::{SynthesisOutput, SynthesizedAudio, VocoderModel};
use crate::config::ModelConfig;
use crate::error::InferError;
use crate::inference::PitchMode;

/// Leaky ReLU activation
fn leaky_relu(x: &Tensor, negative_slope: f64) -> Result<Tensor> {
    let zeros = Tensor::zeros_like(x)?;
    let positive = x.maximum(&zeros)?;
    let negative = (x.minimum(&zeros)? * negative_slope)?;
    (positive + negative).map_err(Into::into)
}

/// DDSP output scaling: 2 * sigmoid(x)^ln(10) + 1e-7
fn scale_function(x: &Tensor) -> Result<Tensor> {
    let s = candle_nn::ops::sigmoid(x)?;
    s.powf(std::f64::consts::LN_10)?
        .affine(2.0, 1e-7)
        .map_err(Into::into)
}

fn conv3(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Conv1d> {
    let cfg = Conv1dConfig {
        padding: 1,
        ..Default::default()
    };
    Ok(candle_nn::conv1d(in_channels, out_channels, 3, cfg, vb)?)
}

/// Pre-norm residual conv block operating on (batch, frames, hidden)
struct ResidualBlock {
    norm: LayerNorm,
    conv: Conv1d,
}

impl ResidualBlock {
    fn new(hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            norm: candle_nn::layer_norm(hidden, 1e-5, vb.pp("norm"))?,
            conv: conv3(hidden, hidden, vb.pp("conv"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.norm.forward(x)?.transpose(1, 2)?.contiguous()?;
        let h = leaky_relu(&self.conv.forward(&h)?, 0.2)?;
        let h = h.transpose(1, 2)?;
        (x + h).map_err(Into::into)
    }
}

/// Control network: (mel, F0) -> (harmonic amplitudes, noise magnitudes)
pub struct SinsNetwork {
    conv_in: Conv1d,
    conv_mid: Conv1d,
    f0_embed: Linear,
    blocks: Vec<ResidualBlock>,
    norm: LayerNorm,
    dense_out: Linear,
    n_harmonics: usize,
    n_mag_noise: usize,
}

impl SinsNetwork {
    /// Build the network from a var builder
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let n_mels = config.data.n_mels;
        let m = &config.model;

        let blocks = (0..m.n_layers)
            .map(|i| ResidualBlock::new(m.hidden_dim, vb.pp(format!("blocks.{}", i))))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            conv_in: conv3(n_mels, m.hidden_dim, vb.pp("conv_in"))?,
            conv_mid: conv3(m.hidden_dim, m.hidden_dim, vb.pp("conv_mid"))?,
            f0_embed: candle_nn::linear(1, m.hidden_dim, vb.pp("f0_embed"))?,
            blocks,
            norm: candle_nn::layer_norm(m.hidden_dim, 1e-5, vb.pp("norm"))?,
            dense_out: candle_nn::linear(
                m.hidden_dim,
                m.n_harmonics + m.n_mag_noise,
                vb.pp("dense_out"),
            )?,
            n_harmonics: m.n_harmonics,
            n_mag_noise: m.n_mag_noise,
        })
    }

    /// Tensor names the network reads from a checkpoint
    pub fn expected_keys(config: &ModelConfig) -> Vec<String> {
        let mut prefixes: Vec<String> = vec!["conv_in".into(), "conv_mid".into(), "f0_embed".into()];
        for i in 0..config.model.n_layers {
            prefixes.push(format!("blocks.{}.norm", i));
            prefixes.push(format!("blocks.{}.conv", i));
        }
        prefixes.push("norm".into());
        prefixes.push("dense_out".into());

        prefixes
            .iter()
            .flat_map(|p| [format!("{}.weight", p), format!("{}.bias", p)])
            .collect()
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `mel` - Mel spectrogram (batch, frames, n_mels)
    /// * `f0` - F0 in Hz (batch, frames, 1)
    ///
    /// # Returns
    /// * Harmonic amplitudes (batch, frames, n_harmonics)
    /// * Noise magnitudes (batch, frames, n_mag_noise)
    pub fn forward(&self, mel: &Tensor, f0: &Tensor) -> Result<(Tensor, Tensor)> {
        let x = mel.transpose(1, 2)?.contiguous()?;
        let x = leaky_relu(&self.conv_in.forward(&x)?, 0.2)?;
        let x = self.conv_mid.forward(&x)?.transpose(1, 2)?;

        let f0_feat = ((f0 / 700.0)? + 1.0)?.log()?;
        let mut x = x.broadcast_add(&self.f0_embed.forward(&f0_feat)?)?;

        for block in &self.blocks {
            x = block.forward(&x)?;
        }

        let x = self.norm.forward(&x)?;
        let ctrls = scale_function(&self.dense_out.forward(&x)?)?;

        let amplitudes = ctrls.narrow(2, 0, self.n_harmonics)?;
        let noise_magnitude = ctrls.narrow(2, self.n_harmonics, self.n_mag_noise)?;
        Ok((amplitudes, noise_magnitude))
    }
}

/// Complete vocoder: control network plus DSP synthesizers
pub struct SinsVocoder {
    device: Device,
    config: ModelConfig,
    network: SinsNetwork,
    harmonic: HarmonicSynth,
    noise: NoiseSynth,
}

impl SinsVocoder {
    /// Build from a var builder (checkpoint or freshly initialized vars)
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();
        let network = SinsNetwork::new(&config, vb)?;
        let harmonic = HarmonicSynth::new(config.data.sampling_rate, config.data.block_size);
        let noise = NoiseSynth::new(config.data.block_size, config.model.n_mag_noise);

        Ok(Self {
            device,
            config,
            network,
            harmonic,
            noise,
        })
    }

    /// Load weights from a safetensors checkpoint
    pub fn load<P: AsRef<Path>>(path: P, config: ModelConfig, device: &Device) -> Result<Self> {
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path.as_ref()], DType::F32, device)? };
        Self::new(config, vb)
    }

    /// Model configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl VocoderModel for SinsVocoder {
    fn sample_rate(&self) -> u32 {
        self.config.data.sampling_rate
    }

    fn block_size(&self) -> usize {
        self.config.data.block_size
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn synthesize(&self, mel: &Tensor, f0: &Tensor, mode: PitchMode) -> Result<SynthesisOutput> {
        let (batch, frames, _) = mel.dims3()?;
        let (f0_batch, f0_frames, _) = f0.dims3()?;
        if batch != 1 || f0_batch != 1 {
            bail!("vocoder expects batch size 1, got mel {} / f0 {}", batch, f0_batch);
        }
        if f0_frames != frames {
            return Err(InferError::FrameMismatch {
                mel_frames: frames,
                f0_frames,
            }
            .into());
        }

        let (amplitudes, noise_magnitude) = self.network.forward(mel, f0)?;
        let amplitudes: Vec<Vec<f32>> = amplitudes.squeeze(0)?.to_vec2()?;
        let noise_magnitude: Vec<Vec<f32>> = noise_magnitude.squeeze(0)?.to_vec2()?;
        let f0_frames: Vec<f32> = f0.flatten_all()?.to_vec1()?;

        let (harmonic, sinusoid) = self.harmonic.render(&f0_frames, &amplitudes);
        let mut rng = StdRng::seed_from_u64(self.config.model.noise_seed);
        let noise = self.noise.render(&noise_magnitude, &mut rng);
        let audio = SynthesizedAudio::mix(harmonic, noise);

        debug!(
            "Synthesized {} samples from {} frames ({:?})",
            audio.signal.len(),
            frames,
            mode
        );

        Ok(match mode {
            PitchMode::Native => SynthesisOutput::Direct { audio, sinusoid },
            PitchMode::Shifted(_) => SynthesisOutput::OverriddenPitch { audio },
        })
    }
}
