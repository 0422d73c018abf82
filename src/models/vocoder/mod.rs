//! Vocoder module for (mel, F0)-to-waveform synthesis
//!
//! Implements a DDSP sinusoidal-plus-noise vocoder. The [`VocoderModel`]
//! trait is the seam the inference pipeline calls through.

mod sins;
mod synth;

pub use sins::{SinsNetwork, SinsVocoder};
pub use synth::{HarmonicSynth, NoiseSynth};

use anyhow::Result;
use candle_core::{Device, Tensor};

use crate::inference::PitchMode;

/// A model mapping (mel, F0) to audio with a harmonic/noise split
pub trait VocoderModel {
    /// Output sampling rate
    fn sample_rate(&self) -> u32;

    /// Samples rendered per feature frame
    fn block_size(&self) -> usize;

    /// Device input tensors must live on
    fn device(&self) -> &Device;

    /// Run the forward pass
    ///
    /// # Arguments
    /// * `mel` - Mel spectrogram (1, frames, n_mels)
    /// * `f0` - F0 in Hz, already transposed if `mode` is shifted (1, frames, 1)
    /// * `mode` - Selects which output variant is returned
    fn synthesize(&self, mel: &Tensor, f0: &Tensor, mode: PitchMode) -> Result<SynthesisOutput>;
}

/// Rendered waveforms; `signal` is the sum of the two components
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Full output
    pub signal: Vec<f32>,
    /// Periodic part
    pub harmonic: Vec<f32>,
    /// Aperiodic part
    pub noise: Vec<f32>,
}

impl SynthesizedAudio {
    /// Sum the components into a signal; lengths are truncated to the shorter one
    pub fn mix(mut harmonic: Vec<f32>, mut noise: Vec<f32>) -> Self {
        let len = harmonic.len().min(noise.len());
        harmonic.truncate(len);
        noise.truncate(len);
        let signal = harmonic.iter().zip(&noise).map(|(h, n)| h + n).collect();
        Self {
            signal,
            harmonic,
            noise,
        }
    }

    /// Cut all three waveforms to at most `len` samples
    pub fn truncate(&mut self, len: usize) {
        self.signal.truncate(len);
        self.harmonic.truncate(len);
        self.noise.truncate(len);
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }
}

/// Per-frame oscillator parameters, [frames][n_harmonics]
#[derive(Debug, Clone)]
pub struct SinusoidParams {
    /// Harmonic amplitudes, zeroed above Nyquist
    pub magnitudes: Vec<Vec<f32>>,
    /// Harmonic phases at frame start, wrapped to [-pi, pi)
    pub phases: Vec<Vec<f32>>,
}

/// Forward pass result
#[derive(Debug, Clone)]
pub enum SynthesisOutput {
    /// Synthesis driven by the extracted pitch; exposes oscillator parameters
    Direct {
        /// Rendered audio
        audio: SynthesizedAudio,
        /// Oscillator parameters
        sinusoid: SinusoidParams,
    },
    /// Synthesis driven by a transposed pitch contour
    OverriddenPitch {
        /// Rendered audio
        audio: SynthesizedAudio,
    },
}

impl SynthesisOutput {
    /// Rendered audio of either variant
    pub fn audio(&self) -> &SynthesizedAudio {
        match self {
            SynthesisOutput::Direct { audio, .. } | SynthesisOutput::OverriddenPitch { audio } => audio,
        }
    }

    /// Mutable access to the rendered audio
    pub fn audio_mut(&mut self) -> &mut SynthesizedAudio {
        match self {
            SynthesisOutput::Direct { audio, .. } | SynthesisOutput::OverriddenPitch { audio } => audio,
        }
    }

    /// Oscillator parameters, only present for native-pitch synthesis
    pub fn sinusoid(&self) -> Option<&SinusoidParams> {
        match self {
            SynthesisOutput::Direct { sinusoid, .. } => Some(sinusoid),
            SynthesisOutput::OverriddenPitch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_sums_components() {
        let audio = SynthesizedAudio::mix(vec![0.5, -0.25, 1.0], vec![0.25, 0.25]);
        assert_eq!(audio.len(), 2);
        assert_eq!(audio.signal, vec![0.75, 0.0]);
    }

    #[test]
    fn test_truncate() {
        let mut audio = SynthesizedAudio::mix(vec![0.1; 10], vec![0.1; 10]);
        audio.truncate(4);
        assert_eq!(audio.harmonic.len(), 4);
        assert_eq!(audio.noise.len(), 4);
        audio.truncate(100);
        assert_eq!(audio.len(), 4);
    }
}
