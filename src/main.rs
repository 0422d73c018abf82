//! ddsp-infer CLI - Run a DDSP vocoder over WAV files

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ddsp_infer::inference::batch::{self, validate_existing_path, validate_model_path};
use ddsp_infer::{BatchRequest, ComputeDevice, InferencePipeline, PitchMode, VERSION};

/// ddsp-infer - Resynthesize audio with a DDSP sinusoidal-plus-noise vocoder
#[derive(Parser, Debug)]
#[command(name = "ddsp-infer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the model checkpoint (config.yaml must sit beside it)
    #[arg(long = "model_path", value_parser = validate_model_path)]
    model_path: PathBuf,

    /// WAV file or directory of WAV files
    #[arg(short, long, value_parser = validate_existing_path)]
    input: PathBuf,

    /// Existing output directory
    #[arg(short, long, value_parser = validate_existing_path)]
    output: PathBuf,

    /// Pitch shift in semitones
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    key: i32,

    /// Device to run the model on
    #[arg(long, value_enum, default_value_t = ComputeDevice::Cpu)]
    device: ComputeDevice,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn create_spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(msg.to_string());
    Ok(pb)
}

fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    info!("ddsp-infer v{}", VERSION);

    let device = cli.device.resolve()?;
    let pb = create_spinner("Loading model...")?;
    let pipeline = InferencePipeline::load(&cli.model_path, &device)
        .with_context(|| format!("Failed to load model from {:?}", cli.model_path))?;
    pb.finish_and_clear();
    info!("Model sampling rate: {} Hz", pipeline.sample_rate());

    let request = BatchRequest {
        input: cli.input,
        output: cli.output,
        mode: PitchMode::from_key(cli.key),
    };
    if let PitchMode::Shifted(semitones) = request.mode {
        info!("Transposing by {} semitone(s)", semitones);
    }

    let progress = create_progress_bar()?;
    let results = batch::run(&pipeline, &request, &progress)?;

    let seconds: f32 = results.iter().map(|r| r.duration()).sum();
    info!("Processed {} file(s), {:.2}s of audio", results.len(), seconds);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    struct Paths {
        _dir: tempfile::TempDir,
        model: String,
        input: String,
        output: String,
    }

    fn paths() -> Paths {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.safetensors");
        std::fs::write(&model, b"x").unwrap();
        let input = dir.path().join("in.wav");
        std::fs::write(&input, b"x").unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir(&output).unwrap();

        let s = |p: PathBuf| p.to_string_lossy().into_owned();
        Paths {
            model: s(model),
            input: s(input),
            output: s(output),
            _dir: dir,
        }
    }

    fn parse(paths: &Paths, extra: &[&str]) -> Result<Cli, clap::Error> {
        let mut args = vec![
            "ddsp-infer",
            "--model_path",
            paths.model.as_str(),
            "--input",
            paths.input.as_str(),
            "--output",
            paths.output.as_str(),
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_defaults() {
        let paths = paths();
        let cli = parse(&paths, &[]).unwrap();
        assert_eq!(cli.key, 0);
        assert_eq!(cli.device, ComputeDevice::Cpu);
        assert!(!cli.verbose);
        assert!(cli.model_path.is_absolute());
        assert_eq!(PitchMode::from_key(cli.key), PitchMode::Native);
    }

    #[test]
    fn test_negative_key() {
        let paths = paths();
        let cli = parse(&paths, &["--key", "-3"]).unwrap();
        assert_eq!(cli.key, -3);
        assert_eq!(PitchMode::from_key(cli.key), PitchMode::Shifted(-3));

        let cli = parse(&paths, &["-k", "5", "--device", "cuda", "-v"]).unwrap();
        assert_eq!(cli.key, 5);
        assert_eq!(cli.device, ComputeDevice::Cuda);
        assert!(cli.verbose);
    }

    #[test]
    fn test_model_path_spelling() {
        let paths = paths();
        let err = Cli::try_parse_from([
            "ddsp-infer",
            "--model-path",
            paths.model.as_str(),
            "--input",
            paths.input.as_str(),
            "--output",
            paths.output.as_str(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_rejects_bad_paths() {
        let paths = paths();
        let missing = format!("{}.missing", paths.model);
        let err = Cli::try_parse_from([
            "ddsp-infer",
            "--model_path",
            missing.as_str(),
            "--input",
            paths.input.as_str(),
            "--output",
            paths.output.as_str(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);

        // A directory is not a checkpoint
        let err = Cli::try_parse_from([
            "ddsp-infer",
            "--model_path",
            paths.output.as_str(),
            "--input",
            paths.input.as_str(),
            "--output",
            paths.output.as_str(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_rejects_bad_device_and_key() {
        let paths = paths();
        assert_eq!(
            parse(&paths, &["--device", "tpu"]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            parse(&paths, &["--key", "up"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
    }
}
