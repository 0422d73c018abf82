//! Per-file inference pipeline
//!
//! Orchestrates one input file:
//! 1. Decode the waveform and check its sample rate against the model
//! 2. Extract mel / F0 / UV features
//! 3. Resolve the F0 handed to the model (native or transposed)
//! 4. Run the vocoder on batch-size-1 tensors
//! 5. Write the signal and its harmonic / noise parts as float WAV

use anyhow::Result;
use candle_core::{Device, Tensor};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::pitch::{resolve_f0, PitchMode};
use crate::audio::{AudioLoader, AudioOutput};
use crate::error::InferError;
use crate::models::{load_model, ModelBundle, SynthesisOutput};
use crate::preprocess::{FeatureSet, Preprocessor};

/// The three files written for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Full signal, at the requested output path
    pub signal: PathBuf,
    /// Harmonic component, `<name>.harmonic.wav`
    pub harmonic: PathBuf,
    /// Noise component, `<name>.noise.wav`
    pub noise: PathBuf,
}

impl OutputPaths {
    /// Derive component paths from the signal path
    pub fn for_output<P: AsRef<Path>>(output: P) -> Self {
        let signal = output.as_ref().to_path_buf();
        Self {
            harmonic: signal.with_extension("harmonic.wav"),
            noise: signal.with_extension("noise.wav"),
            signal,
        }
    }

    /// All three paths
    pub fn all(&self) -> [&Path; 3] {
        [&self.signal, &self.harmonic, &self.noise]
    }
}

/// Result of inference on one file
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Files written
    pub outputs: OutputPaths,
    /// Feature frames processed
    pub frames: usize,
    /// Samples per output file
    pub num_samples: usize,
    /// Output sample rate
    pub sample_rate: u32,
    /// Pitch handling used
    pub mode: PitchMode,
}

impl InferenceResult {
    /// Get duration in seconds
    pub fn duration(&self) -> f32 {
        self.num_samples as f32 / self.sample_rate as f32
    }
}

/// Inference pipeline around a loaded model
///
/// The bundle is loaded once and reused read-only for every file.
pub struct InferencePipeline {
    bundle: ModelBundle,
    preprocessor: Preprocessor,
}

impl InferencePipeline {
    /// Create from an already loaded model
    pub fn new(bundle: ModelBundle) -> Self {
        let preprocessor = Preprocessor::new(&bundle.config.data);
        Self {
            bundle,
            preprocessor,
        }
    }

    /// Load a checkpoint (and its `config.yaml`) onto a device
    pub fn load<P: AsRef<Path>>(model_path: P, device: &Device) -> Result<Self> {
        Ok(Self::new(load_model(model_path, device)?))
    }

    /// The loaded model and config
    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Sampling rate inputs must have and outputs are written at
    pub fn sample_rate(&self) -> u32 {
        self.bundle.sample_rate()
    }

    /// Run inference on one file
    ///
    /// # Arguments
    /// * `input` - WAV file at the model's sampling rate
    /// * `output` - Path of the full signal; component files are derived from it
    /// * `mode` - Native pitch or a semitone transposition
    pub fn infer<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        mode: PitchMode,
    ) -> Result<InferenceResult> {
        let input = input.as_ref();
        info!("Processing file: {:?}", input);

        let waveform = AudioLoader::load(input)?;
        let expected = self.sample_rate();
        if waveform.sample_rate != expected {
            return Err(InferError::SampleRateMismatch {
                path: input.to_path_buf(),
                found: waveform.sample_rate,
                expected,
            }
            .into());
        }

        let features = self.preprocessor.mel_f0_uv_process(&waveform.samples)?;
        let mut synthesis = self.synthesize(&features, mode)?;

        let audio = synthesis.audio_mut();
        audio.truncate(waveform.len());

        let outputs = OutputPaths::for_output(output);
        AudioOutput::save(&audio.signal, expected, &outputs.signal)?;
        AudioOutput::save(&audio.harmonic, expected, &outputs.harmonic)?;
        AudioOutput::save(&audio.noise, expected, &outputs.noise)?;
        debug!("Wrote {:?}", outputs.signal);

        Ok(InferenceResult {
            outputs,
            frames: features.num_frames(),
            num_samples: audio.len(),
            sample_rate: expected,
            mode,
        })
    }

    /// Run the model on extracted features
    pub fn synthesize(&self, features: &FeatureSet, mode: PitchMode) -> Result<SynthesisOutput> {
        features.validate()?;

        let model = &self.bundle.model;
        let device = model.device();
        let frames = features.num_frames();

        let mel = Tensor::from_vec(features.mel_flat(), (1, frames, features.num_mels()), device)?;
        let f0 = Tensor::from_vec(resolve_f0(&features.f0, mode), (1, frames, 1), device)?;
        debug!(
            "Model input: mel {:?}, f0 {:?}, key {}",
            mel.dims(),
            f0.dims(),
            mode.semitones()
        );

        model.synthesize(&mel, &f0, mode)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::models::vocoder::{SinusoidParams, SynthesizedAudio, VocoderModel};
    use std::cell::RefCell;
    use std::f32::consts::PI;
    use std::rc::Rc;

    /// Vocoder stand-in that records the F0 it was called with
    pub(crate) struct RecordingModel {
        pub block_size: usize,
        pub sample_rate: u32,
        pub device: Device,
        pub calls: Rc<RefCell<Vec<Vec<f32>>>>,
    }

    impl VocoderModel for RecordingModel {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn block_size(&self) -> usize {
            self.block_size
        }

        fn device(&self) -> &Device {
            &self.device
        }

        fn synthesize(&self, mel: &Tensor, f0: &Tensor, mode: PitchMode) -> Result<SynthesisOutput> {
            let (_, frames, _) = mel.dims3()?;
            self.calls.borrow_mut().push(f0.flatten_all()?.to_vec1()?);

            let len = frames * self.block_size;
            let audio = SynthesizedAudio::mix(vec![0.25; len], vec![0.125; len]);
            Ok(match mode {
                PitchMode::Native => SynthesisOutput::Direct {
                    audio,
                    sinusoid: SinusoidParams {
                        magnitudes: vec![],
                        phases: vec![],
                    },
                },
                PitchMode::Shifted(_) => SynthesisOutput::OverriddenPitch { audio },
            })
        }
    }

    pub(crate) fn test_config() -> ModelConfig {
        let mut config = ModelConfig::default();
        config.data.sampling_rate = 16000;
        config.data.block_size = 160;
        config.data.n_fft = 512;
        config.data.win_length = 512;
        config.data.n_mels = 16;
        config.data.f0_window = 1024;
        config
    }

    pub(crate) fn recording_pipeline() -> (InferencePipeline, Rc<RefCell<Vec<Vec<f32>>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let model = RecordingModel {
            block_size: 160,
            sample_rate: 16000,
            device: Device::Cpu,
            calls: calls.clone(),
        };
        let bundle = ModelBundle::new(Box::new(model), test_config());
        (InferencePipeline::new(bundle), calls)
    }

    pub(crate) fn write_tone(path: &Path, sample_rate: u32, seconds: f32) {
        let len = (sample_rate as f32 * seconds) as usize;
        let samples: Vec<f32> = (0..len)
            .map(|i| 0.5 * (2.0 * PI * 220.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        AudioOutput::save(&samples, sample_rate, path).unwrap();
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::for_output("/out/a.wav");
        assert_eq!(paths.signal, PathBuf::from("/out/a.wav"));
        assert_eq!(paths.harmonic, PathBuf::from("/out/a.harmonic.wav"));
        assert_eq!(paths.noise, PathBuf::from("/out/a.noise.wav"));
    }

    #[test]
    fn test_native_pitch_passes_raw_f0() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, 16000, 0.5);
        let (pipeline, calls) = recording_pipeline();

        let result = pipeline
            .infer(&input, dir.path().join("out.wav"), PitchMode::Native)
            .unwrap();

        let features = pipeline
            .preprocessor
            .mel_f0_uv_process(&AudioLoader::load(&input).unwrap().samples)
            .unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0], features.f0);
        assert_eq!(result.frames, features.num_frames());
    }

    #[test]
    fn test_shifted_pitch_scales_f0() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, 16000, 0.5);
        let (pipeline, calls) = recording_pipeline();

        pipeline
            .infer(&input, dir.path().join("out.wav"), PitchMode::Shifted(12))
            .unwrap();

        let features = pipeline
            .preprocessor
            .mel_f0_uv_process(&AudioLoader::load(&input).unwrap().samples)
            .unwrap();
        let passed = &calls.borrow()[0];
        for (raw, shifted) in features.f0.iter().zip(passed) {
            assert!((raw * 2.0 - shifted).abs() < 1e-3);
        }
    }

    #[test]
    fn test_sample_rate_mismatch_skips_model() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, 22050, 0.25);
        let (pipeline, calls) = recording_pipeline();
        let output = dir.path().join("out.wav");

        let err = pipeline.infer(&input, &output, PitchMode::Native).unwrap_err();
        match err.downcast_ref::<InferError>() {
            Some(InferError::SampleRateMismatch { found, expected, .. }) => {
                assert_eq!((*found, *expected), (22050, 16000));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(calls.borrow().is_empty());
        assert!(!output.exists());
    }

    #[test]
    fn test_outputs_match_input_length() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_tone(&input, 16000, 1.0);
        let (pipeline, _calls) = recording_pipeline();

        let result = pipeline
            .infer(&input, dir.path().join("in.wav.out.wav"), PitchMode::Native)
            .unwrap();

        assert_eq!(result.num_samples, 16000);
        assert!((result.duration() - 1.0).abs() < 1e-6);
        for path in result.outputs.all() {
            let wav = AudioLoader::load(path).unwrap();
            assert_eq!(wav.sample_rate, 16000);
            assert_eq!(wav.len(), 16000);
        }
    }
}
