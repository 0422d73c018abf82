//! Feature extraction for the vocoder
//!
//! Turns a waveform into frame-aligned conditioning features:
//! - log-magnitude mel spectrogram
//! - F0 contour, with unvoiced gaps interpolated
//! - voiced/unvoiced flags (1.0 = unvoiced)

mod pitch;

pub use pitch::PitchExtractor;

use anyhow::Result;
use tracing::debug;

use crate::audio::MelSpectrogram;
use crate::config::DataConfig;
use crate::error::InferError;

/// Conditioning features of one waveform
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Mel spectrogram, [frames][n_mels]
    pub mel: Vec<Vec<f32>>,
    /// F0 per frame in Hz
    pub f0: Vec<f32>,
    /// 1.0 for unvoiced frames, 0.0 for voiced
    pub uv: Vec<f32>,
}

impl FeatureSet {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.mel.len()
    }

    /// Number of mel bins (0 when there are no frames)
    pub fn num_mels(&self) -> usize {
        self.mel.first().map_or(0, Vec::len)
    }

    /// Check that mel, F0 and UV agree on the number of frames
    pub fn validate(&self) -> Result<()> {
        let mel_frames = self.mel.len();
        let ragged = self.mel.iter().any(|row| row.len() != self.num_mels());
        if ragged || self.f0.len() != mel_frames || self.uv.len() != mel_frames {
            return Err(InferError::ShapeMismatch {
                mel_frames,
                f0_len: self.f0.len(),
                uv_len: self.uv.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Mel frames flattened row-major, ready for a (frames, n_mels) tensor
    pub fn mel_flat(&self) -> Vec<f32> {
        self.mel.iter().flatten().copied().collect()
    }

    /// Fraction of frames marked voiced
    pub fn voiced_ratio(&self) -> f32 {
        if self.uv.is_empty() {
            return 0.0;
        }
        self.uv.iter().filter(|&&u| u < 0.5).count() as f32 / self.uv.len() as f32
    }
}

/// Waveform to feature converter
pub struct Preprocessor {
    block_size: usize,
    mel: MelSpectrogram,
    pitch: PitchExtractor,
}

impl Preprocessor {
    /// Create from the `data` section of a model config
    pub fn new(config: &DataConfig) -> Self {
        Self {
            block_size: config.block_size,
            mel: MelSpectrogram::from_config(config),
            pitch: PitchExtractor::from_config(config),
        }
    }

    /// Frames produced for a signal of `num_samples`
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.block_size + 1
    }

    /// Extract mel, F0 and UV aligned to the same frame grid
    pub fn mel_f0_uv_process(&self, audio: &[f32]) -> Result<FeatureSet> {
        let num_frames = self.num_frames(audio.len());

        let mel = self.mel.compute(audio)?;
        let mut f0 = self.pitch.extract(audio, num_frames);
        let uv: Vec<f32> = f0.iter().map(|&f| if f > 0.0 { 0.0 } else { 1.0 }).collect();
        interpolate_unvoiced(&mut f0);

        let features = FeatureSet { mel, f0, uv };
        features.validate()?;

        debug!(
            "Features: mel {}x{}, f0 {}, uv {}, voiced {:.0}%",
            features.num_frames(),
            features.num_mels(),
            features.f0.len(),
            features.uv.len(),
            features.voiced_ratio() * 100.0
        );

        Ok(features)
    }
}

/// Fill zero (unvoiced) entries by linear interpolation between voiced
/// neighbours; leading and trailing gaps take the nearest voiced value.
/// A contour with no voiced frames is left untouched.
pub fn interpolate_unvoiced(f0: &mut [f32]) {
    let voiced: Vec<usize> = (0..f0.len()).filter(|&i| f0[i] > 0.0).collect();
    let (Some(&first), Some(&last)) = (voiced.first(), voiced.last()) else {
        return;
    };

    let head = f0[first];
    f0[..first].iter_mut().for_each(|v| *v = head);
    let tail = f0[last];
    f0[last + 1..].iter_mut().for_each(|v| *v = tail);

    for pair in voiced.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let (fa, fb) = (f0[a], f0[b]);
        for i in a + 1..b {
            let t = (i - a) as f32 / (b - a) as f32;
            f0[i] = fa + (fb - fa) * t;
        }
    }
}
