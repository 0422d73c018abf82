//! DSP renderers for the sinusoidal and noise branches

use rand::Rng;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use super::SinusoidParams;

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Wrap a phase to [-pi, pi)
fn wrap_phase(phase: f64) -> f64 {
    (phase + PI).rem_euclid(TAU) - PI
}

/// Additive harmonic oscillator bank
///
/// Frame values sit at the first sample of each block and are linearly
/// interpolated towards the next frame. Harmonics at or above Nyquist are
/// muted sample by sample.
pub struct HarmonicSynth {
    sample_rate: u32,
    block_size: usize,
}

impl HarmonicSynth {
    /// Create a renderer
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }

    /// Render `f0.len() * block_size` samples
    ///
    /// # Arguments
    /// * `f0` - Fundamental per frame in Hz
    /// * `amplitudes` - Harmonic amplitudes per frame, [frames][n_harmonics]
    pub fn render(&self, f0: &[f32], amplitudes: &[Vec<f32>]) -> (Vec<f32>, SinusoidParams) {
        let frames = f0.len().min(amplitudes.len());
        let n_harmonics = amplitudes.first().map_or(0, Vec::len);
        let sr = self.sample_rate as f64;
        let nyquist = self.sample_rate as f32 / 2.0;

        let mut out = Vec::with_capacity(frames * self.block_size);
        let mut magnitudes = Vec::with_capacity(frames);
        let mut phases = Vec::with_capacity(frames);
        let mut phase = 0.0f64;

        for t in 0..frames {
            let next = (t + 1).min(frames - 1);

            magnitudes.push(
                (0..n_harmonics)
                    .map(|k| {
                        if (k + 1) as f32 * f0[t] < nyquist {
                            amplitudes[t][k]
                        } else {
                            0.0
                        }
                    })
                    .collect(),
            );
            phases.push(
                (1..=n_harmonics)
                    .map(|k| wrap_phase(k as f64 * phase) as f32)
                    .collect(),
            );

            for j in 0..self.block_size {
                let frac = j as f32 / self.block_size as f32;
                let f = lerp(f0[t], f0[next], frac);

                let mut sample = 0.0f64;
                for k in 0..n_harmonics {
                    let harmonic = (k + 1) as f32;
                    if harmonic * f >= nyquist {
                        break;
                    }
                    let amp = lerp(amplitudes[t][k], amplitudes[next][k], frac);
                    sample += amp as f64 * (harmonic as f64 * phase).sin();
                }
                out.push(sample as f32);

                phase = (phase + TAU * f as f64 / sr).rem_euclid(TAU);
            }
        }

        (out, SinusoidParams { magnitudes, phases })
    }
}

/// Filtered-noise generator
///
/// Each frame of uniform noise is convolved with a zero-phase FIR designed by
/// frequency sampling the frame's magnitude envelope, then overlap-added.
pub struct NoiseSynth {
    block_size: usize,
    n_bands: usize,
    ir_len: usize,
    fft_len: usize,
    ir_window: Vec<f32>,
    ir_inverse: Arc<dyn Fft<f32>>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl NoiseSynth {
    /// Create a renderer for `n_bands`-band magnitude envelopes
    pub fn new(block_size: usize, n_bands: usize) -> Self {
        let ir_len = 2 * n_bands.max(1);
        let fft_len = (block_size + ir_len).next_power_of_two();
        let ir_window = (0..ir_len)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / ir_len as f32).cos())
            .collect();

        let mut planner = FftPlanner::new();
        Self {
            block_size,
            n_bands: n_bands.max(1),
            ir_len,
            fft_len,
            ir_window,
            ir_inverse: planner.plan_fft_inverse(ir_len),
            forward: planner.plan_fft_forward(fft_len),
            inverse: planner.plan_fft_inverse(fft_len),
        }
    }

    /// Windowed, centred impulse response for one magnitude envelope
    fn impulse_response(&self, magnitudes: &[f32]) -> Vec<f32> {
        let band = |k: usize| magnitudes.get(k.min(self.n_bands - 1)).copied().unwrap_or(0.0);

        let mut spectrum = vec![Complex::new(0.0f32, 0.0); self.ir_len];
        for k in 0..=self.n_bands {
            spectrum[k] = Complex::new(band(k), 0.0);
        }
        for k in 1..self.n_bands {
            spectrum[self.ir_len - k] = spectrum[k];
        }
        self.ir_inverse.process(&mut spectrum);

        let half = self.ir_len / 2;
        let scale = self.ir_len as f32;
        (0..self.ir_len)
            .map(|i| spectrum[(i + half) % self.ir_len].re / scale * self.ir_window[i])
            .collect()
    }

    /// Render `magnitudes.len() * block_size` samples of filtered noise
    pub fn render<R: Rng>(&self, magnitudes: &[Vec<f32>], rng: &mut R) -> Vec<f32> {
        let frames = magnitudes.len();
        let total = frames * self.block_size;
        let delay = self.ir_len / 2;
        let scale = self.fft_len as f32;
        let zero = Complex::new(0.0f32, 0.0);

        let mut out = vec![0.0f32; total + self.fft_len];

        for (t, envelope) in magnitudes.iter().enumerate() {
            let mut noise = vec![zero; self.fft_len];
            for slot in noise.iter_mut().take(self.block_size) {
                *slot = Complex::new(rng.gen_range(-1.0f32..1.0), 0.0);
            }

            let mut ir = vec![zero; self.fft_len];
            for (slot, v) in ir.iter_mut().zip(self.impulse_response(envelope)) {
                *slot = Complex::new(v, 0.0);
            }

            self.forward.process(&mut noise);
            self.forward.process(&mut ir);
            for (n, h) in noise.iter_mut().zip(&ir) {
                *n *= h;
            }
            self.inverse.process(&mut noise);

            let offset = t * self.block_size;
            for (j, y) in noise.iter().enumerate() {
                let idx = offset + j;
                if idx >= delay {
                    out[idx - delay] += y.re / scale;
                }
            }
        }

        out.truncate(total);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn energy(x: &[f32]) -> f64 {
        x.iter().map(|&v| (v as f64).powi(2)).sum()
    }

    #[test]
    fn test_single_harmonic_is_sine() {
        let synth = HarmonicSynth::new(16000, 160);
        let f0 = vec![100.0; 10];
        let amps = vec![vec![1.0]; 10];

        let (out, _) = synth.render(&f0, &amps);
        assert_eq!(out.len(), 1600);
        for (n, &s) in out.iter().enumerate().step_by(37) {
            let expected = (TAU * 100.0 * n as f64 / 16000.0).sin() as f32;
            assert!((s - expected).abs() < 1e-3, "sample {n}: {s} vs {expected}");
        }
    }

    #[test]
    fn test_harmonics_above_nyquist_are_muted() {
        let synth = HarmonicSynth::new(16000, 160);
        let f0 = vec![5000.0; 4];
        let amps = vec![vec![0.5, 0.5, 0.5]; 4];

        let (out, params) = synth.render(&f0, &amps);
        assert_eq!(params.magnitudes[0], vec![0.5, 0.0, 0.0]);

        // Only the fundamental sounds, so the output stays within its amplitude
        assert!(out.iter().all(|s| s.abs() <= 0.5 + 1e-4));
    }

    #[test]
    fn test_frame_phases() {
        let synth = HarmonicSynth::new(16000, 160);
        // 25 Hz advances a quarter cycle per 160-sample block
        let (_, params) = synth.render(&[25.0; 3], &[vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]]);
        assert!(params.phases[0].iter().all(|&p| p.abs() < 1e-6));
        assert!((params.phases[1][0] - std::f32::consts::FRAC_PI_2).abs() < 1e-3);
        assert!((params.phases[1][1].abs() - std::f32::consts::PI).abs() < 1e-3);
    }

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(3.0 * PI) + PI).abs() < 1e-9);
        assert!((wrap_phase(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_phase(-0.5) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_noise_length_and_determinism() {
        let synth = NoiseSynth::new(160, 8);
        let mags = vec![vec![1.0; 8]; 12];

        let a = synth.render(&mags, &mut StdRng::seed_from_u64(3));
        let b = synth.render(&mags, &mut StdRng::seed_from_u64(3));
        assert_eq!(a.len(), 12 * 160);
        assert_eq!(a, b);
        assert!(energy(&a) > 0.0);
    }

    #[test]
    fn test_noise_scales_with_magnitude() {
        let synth = NoiseSynth::new(160, 8);
        let loud = synth.render(&vec![vec![1.0; 8]; 6], &mut StdRng::seed_from_u64(1));
        let quiet = synth.render(&vec![vec![0.5; 8]; 6], &mut StdRng::seed_from_u64(1));

        let ratio = energy(&loud) / energy(&quiet);
        assert!((ratio - 4.0).abs() < 1e-2, "ratio {ratio}");
    }

    #[test]
    fn test_silent_envelope_is_silent() {
        let synth = NoiseSynth::new(64, 4);
        let out = synth.render(&vec![vec![0.0; 4]; 5], &mut StdRng::seed_from_u64(0));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_flat_envelope_passes_noise() {
        // A flat unit envelope gives a (windowed) unit impulse
        let synth = NoiseSynth::new(64, 4);
        let ir = synth.impulse_response(&[1.0; 4]);
        let peak = ir
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 4);
        assert!((ir[4] - 1.0).abs() < 1e-5);
    }
}
