//! Pitch transposition

/// How the F0 contour reaches the vocoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PitchMode {
    /// Use the extracted F0 as-is
    #[default]
    Native,
    /// Transpose the extracted F0 by a number of equal-tempered semitones
    Shifted(i32),
}

impl PitchMode {
    /// Map a `--key` value to a mode; 0 means no transposition
    pub fn from_key(key: i32) -> Self {
        if key == 0 {
            PitchMode::Native
        } else {
            PitchMode::Shifted(key)
        }
    }

    /// Frequency ratio applied to F0
    pub fn ratio(self) -> f32 {
        match self {
            PitchMode::Native => 1.0,
            PitchMode::Shifted(semitones) => semitone_ratio(semitones),
        }
    }

    /// Semitones of transposition
    pub fn semitones(self) -> i32 {
        match self {
            PitchMode::Native => 0,
            PitchMode::Shifted(semitones) => semitones,
        }
    }
}

/// `2^(semitones / 12)`
pub fn semitone_ratio(semitones: i32) -> f32 {
    2f32.powf(semitones as f32 / 12.0)
}

/// Transpose an F0 contour. No clamping is applied, so large shifts can
/// push frequencies past Nyquist.
pub fn shift_f0(f0: &[f32], semitones: i32) -> Vec<f32> {
    let ratio = semitone_ratio(semitones);
    f0.iter().map(|&f| f * ratio).collect()
}

/// The contour handed to the vocoder for a given mode
pub fn resolve_f0(f0: &[f32], mode: PitchMode) -> Vec<f32> {
    match mode {
        PitchMode::Native => f0.to_vec(),
        PitchMode::Shifted(semitones) => shift_f0(f0, semitones),
    }
}
