//! Mel spectrogram computation

use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

use crate::config::DataConfig;

/// Mel spectrogram computer
///
/// Frames are centred: the signal is reflect-padded by `n_fft / 2` on both
/// sides, so a signal of `n` samples yields `n / hop_length + 1` frames.
pub struct MelSpectrogram {
    /// FFT size
    pub n_fft: usize,
    /// Hop length
    pub hop_length: usize,
    /// Window length
    pub win_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Sample rate
    pub sample_rate: u32,
    /// Minimum frequency
    pub fmin: f32,
    /// Maximum frequency
    pub fmax: f32,
    /// Mel filterbank
    mel_filters: Vec<Vec<f32>>,
    /// Hann window, zero padded to `n_fft` and centred
    window: Vec<f32>,
}

impl MelSpectrogram {
    /// Create a new mel spectrogram computer
    pub fn new(
        n_fft: usize,
        hop_length: usize,
        win_length: usize,
        n_mels: usize,
        sample_rate: u32,
        fmin: f32,
        fmax: Option<f32>,
    ) -> Self {
        let window = Self::padded_window(win_length, n_fft);
        let fmax = fmax.unwrap_or(sample_rate as f32 / 2.0);
        let mel_filters = Self::mel_filterbank(n_fft, n_mels, sample_rate, fmin, fmax);

        Self {
            n_fft,
            hop_length,
            win_length,
            n_mels,
            sample_rate,
            fmin,
            fmax,
            mel_filters,
            window,
        }
    }

    /// Create from the `data` section of a model config
    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(
            config.n_fft,
            config.block_size,
            config.win_length,
            config.n_mels,
            config.sampling_rate,
            config.mel_fmin,
            config.mel_fmax,
        )
    }

    /// Number of frames produced for a signal of `num_samples`
    pub fn num_frames(&self, num_samples: usize) -> usize {
        num_samples / self.hop_length + 1
    }

    /// Compute log-magnitude mel spectrogram, shape [frames][n_mels]
    pub fn compute(&self, audio: &[f32]) -> Result<Vec<Vec<f32>>> {
        let stft = self.stft(audio)?;
        let magnitude = self.magnitude_spectrum(&stft);
        let mel_spec = self.apply_mel_filters(&magnitude);
        Ok(self.log_compress(&mel_spec))
    }

    /// Short-time Fourier transform over the reflect-padded signal
    fn stft(&self, audio: &[f32]) -> Result<Vec<Vec<Complex<f32>>>> {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let padded = reflect_pad(audio, self.n_fft / 2);
        let num_frames = self.num_frames(audio.len());
        let mut stft_frames = Vec::with_capacity(num_frames);

        for i in 0..num_frames {
            let start = i * self.hop_length;
            let mut frame: Vec<Complex<f32>> = (0..self.n_fft)
                .map(|j| {
                    let sample = padded.get(start + j).copied().unwrap_or(0.0);
                    Complex::new(sample * self.window[j], 0.0)
                })
                .collect();

            fft.process(&mut frame);
            stft_frames.push(frame[..self.n_fft / 2 + 1].to_vec());
        }

        Ok(stft_frames)
    }

    fn magnitude_spectrum(&self, stft: &[Vec<Complex<f32>>]) -> Vec<Vec<f32>> {
        stft.iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// Apply mel filterbank to magnitude spectrum
    fn apply_mel_filters(&self, spec: &[Vec<f32>]) -> Vec<Vec<f32>> {
        spec.iter()
            .map(|frame| {
                self.mel_filters
                    .iter()
                    .map(|filter| filter.iter().zip(frame.iter()).map(|(f, p)| f * p).sum())
                    .collect()
            })
            .collect()
    }

    fn log_compress(&self, mel_spec: &[Vec<f32>]) -> Vec<Vec<f32>> {
        mel_spec
            .iter()
            .map(|frame| frame.iter().map(|v| v.max(1e-5).ln()).collect())
            .collect()
    }

    /// Periodic Hann window of `win_length`, centred inside `n_fft`
    fn padded_window(win_length: usize, n_fft: usize) -> Vec<f32> {
        let offset = n_fft.saturating_sub(win_length) / 2;
        let mut window = vec![0.0; n_fft];
        for i in 0..win_length.min(n_fft) {
            window[offset + i] = 0.5 * (1.0 - (2.0 * PI * i as f32 / win_length as f32).cos());
        }
        window
    }

    /// Hz to Mel conversion
    fn hz_to_mel(hz: f32) -> f32 {
        2595.0 * (1.0 + hz / 700.0).log10()
    }

    /// Mel to Hz conversion
    fn mel_to_hz(mel: f32) -> f32 {
        700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
    }

    /// Create mel filterbank
    fn mel_filterbank(n_fft: usize, n_mels: usize, sr: u32, fmin: f32, fmax: f32) -> Vec<Vec<f32>> {
        let n_freqs = n_fft / 2 + 1;
        let freq_bins: Vec<f32> = (0..n_freqs)
            .map(|i| i as f32 * sr as f32 / n_fft as f32)
            .collect();

        let mel_min = Self::hz_to_mel(fmin);
        let mel_max = Self::hz_to_mel(fmax);
        let mel_points: Vec<f32> = (0..n_mels + 2)
            .map(|i| Self::mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
            .collect();

        let mut filters = vec![vec![0.0; n_freqs]; n_mels];

        for i in 0..n_mels {
            let left = mel_points[i];
            let center = mel_points[i + 1];
            let right = mel_points[i + 2];

            for (j, &freq) in freq_bins.iter().enumerate() {
                if freq >= left && freq <= center {
                    filters[i][j] = (freq - left) / (center - left);
                } else if freq > center && freq <= right {
                    filters[i][j] = (right - freq) / (right - center);
                }
            }
        }

        filters
    }
}

/// Mirror the signal at both ends without repeating the edge sample
fn reflect_pad(audio: &[f32], pad: usize) -> Vec<f32> {
    let len = audio.len() as isize;
    match len {
        0 => return vec![0.0; 2 * pad],
        1 => return vec![audio[0]; 2 * pad + 1],
        _ => {}
    }

    let period = 2 * (len - 1);
    (-(pad as isize)..len + pad as isize)
        .map(|i| {
            let mut j = i.rem_euclid(period);
            if j >= len {
                j = period - j;
            }
            audio[j as usize]
        })
        .collect()
}
