//! Frame-wise F0 estimation
//!
//! Uses the normalized square difference function (NSDF) of the McLeod pitch
//! method: autocorrelation via FFT, normalized by the running energy, then the
//! first key maximum within 90% of the strongest one is taken as the period.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::config::DataConfig;

/// Ratio of the strongest key maximum a peak must reach to be picked
const KEY_MAXIMUM_RATIO: f32 = 0.9;

/// Per-frame F0 estimator
pub struct PitchExtractor {
    sample_rate: u32,
    hop_length: usize,
    window_length: usize,
    f0_min: f32,
    f0_max: f32,
    threshold: f32,
    fft_len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl PitchExtractor {
    /// Create an extractor
    pub fn new(
        sample_rate: u32,
        hop_length: usize,
        window_length: usize,
        f0_min: f32,
        f0_max: f32,
        threshold: f32,
    ) -> Self {
        let fft_len = (2 * window_length).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            hop_length,
            window_length,
            f0_min,
            f0_max,
            threshold,
            fft_len,
            forward: planner.plan_fft_forward(fft_len),
            inverse: planner.plan_fft_inverse(fft_len),
        }
    }

    /// Create from the `data` section of a model config
    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(
            config.sampling_rate,
            config.block_size,
            config.f0_window,
            config.f0_min,
            config.f0_max,
            config.f0_threshold,
        )
    }

    /// Estimate F0 for `num_frames` frames centred at multiples of the hop.
    /// Unvoiced frames are reported as 0.
    pub fn extract(&self, audio: &[f32], num_frames: usize) -> Vec<f32> {
        let half = self.window_length as isize / 2;
        let mut frame = vec![0.0f32; self.window_length];

        (0..num_frames)
            .map(|t| {
                let start = (t * self.hop_length) as isize - half;
                for (j, slot) in frame.iter_mut().enumerate() {
                    let idx = start + j as isize;
                    *slot = if idx >= 0 && (idx as usize) < audio.len() {
                        audio[idx as usize]
                    } else {
                        0.0
                    };
                }
                self.detect(&frame).unwrap_or(0.0)
            })
            .collect()
    }

    /// Detect the fundamental of one analysis window, None when unvoiced
    pub fn detect(&self, frame: &[f32]) -> Option<f32> {
        let nsdf = self.nsdf(frame)?;

        let min_tau = ((self.sample_rate as f32 / self.f0_max).floor() as usize).max(1);
        let max_tau = (self.sample_rate as f32 / self.f0_min).ceil() as usize;
        let limit = (max_tau + 2).min(nsdf.len());

        let peaks: Vec<usize> = key_maxima(&nsdf[..limit])
            .into_iter()
            .filter(|&tau| tau >= min_tau && tau <= max_tau && tau + 1 < nsdf.len())
            .collect();

        let strongest = peaks.iter().map(|&tau| nsdf[tau]).fold(0.0f32, f32::max);
        let tau = *peaks
            .iter()
            .find(|&&tau| nsdf[tau] >= KEY_MAXIMUM_RATIO * strongest)?;

        let (period, clarity) = parabolic_peak(&nsdf, tau);
        if clarity < self.threshold || period <= 0.0 {
            return None;
        }

        let f0 = self.sample_rate as f32 / period;
        (f0 >= self.f0_min && f0 <= self.f0_max).then_some(f0)
    }

    /// NSDF of a frame; None for silent frames
    fn nsdf(&self, frame: &[f32]) -> Option<Vec<f32>> {
        let len = frame.len();
        let energy: f32 = frame.iter().map(|x| x * x).sum();
        if energy < 1e-10 {
            return None;
        }

        let mut spectrum: Vec<Complex<f32>> = frame
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(self.fft_len)
            .collect();
        self.forward.process(&mut spectrum);
        for bin in &mut spectrum {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse.process(&mut spectrum);

        let scale = self.fft_len as f32;
        let mut m = 2.0 * energy;
        let mut nsdf = Vec::with_capacity(len);
        for tau in 0..len {
            if tau > 0 {
                m -= frame[len - tau].powi(2) + frame[tau - 1].powi(2);
            }
            let r = spectrum[tau].re / scale;
            nsdf.push(if m > 1e-10 { 2.0 * r / m } else { 0.0 });
        }
        Some(nsdf)
    }
}

/// Highest point of every positive lobe after the first negative crossing
fn key_maxima(nsdf: &[f32]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut pos = 0;

    while pos < nsdf.len() && nsdf[pos] > 0.0 {
        pos += 1;
    }

    while pos < nsdf.len() {
        while pos < nsdf.len() && nsdf[pos] <= 0.0 {
            pos += 1;
        }
        let mut best: Option<usize> = None;
        while pos < nsdf.len() && nsdf[pos] > 0.0 {
            if best.map_or(true, |b| nsdf[pos] > nsdf[b]) {
                best = Some(pos);
            }
            pos += 1;
        }
        if let Some(b) = best {
            peaks.push(b);
        }
    }

    peaks
}

/// Refine a peak position; returns (interpolated lag, interpolated height)
fn parabolic_peak(values: &[f32], idx: usize) -> (f32, f32) {
    if idx == 0 || idx + 1 >= values.len() {
        return (idx as f32, values[idx]);
    }
    let (a, b, c) = (values[idx - 1], values[idx], values[idx + 1]);
    let denom = a - 2.0 * b + c;
    if denom.abs() < f32::EPSILON {
        return (idx as f32, b);
    }
    let shift = 0.5 * (a - c) / denom;
    (idx as f32 + shift, b - 0.25 * (a - c) * shift)
}
