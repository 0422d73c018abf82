//! Audio file loading

use anyhow::{Context, Result};
use std::path::Path;

use crate::error::InferError;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Create a waveform from raw samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Audio loader for WAV input
pub struct AudioLoader;

impl AudioLoader {
    /// Load audio from a file at its native sample rate, downmixed to mono
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Waveform> {
        let path = path.as_ref();

        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("wav"));
        if !is_wav {
            return Err(InferError::UnsupportedFormat(path.to_path_buf()).into());
        }

        Self::load_wav(path)
    }

    fn load_wav(path: &Path) -> Result<Waveform> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {:?}", path))?;

        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to decode WAV samples: {:?}", path))?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_value))
                    .collect::<Result<_, _>>()
                    .with_context(|| format!("Failed to decode WAV samples: {:?}", path))?
            }
        };

        // Convert to mono if stereo
        let mono_samples = if spec.channels > 1 {
            samples
                .chunks(spec.channels as usize)
                .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
                .collect()
        } else {
            samples
        };

        Ok(Waveform::new(mono_samples, spec.sample_rate))
    }
}
