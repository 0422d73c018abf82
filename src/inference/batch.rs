//! Path validation and batch driving
//!
//! An input path is either one WAV file or a directory whose top-level
//! `*.wav` files are processed in name order. The output path must always be
//! an existing directory; each result is written under the input's file name.

use anyhow::Result;
use indicatif::ProgressBar;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::pipeline::{InferencePipeline, InferenceResult};
use super::pitch::PitchMode;
use crate::error::InferError;

/// One invocation: what to read, where to write, how to pitch
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// WAV file or directory of WAV files
    pub input: PathBuf,
    /// Existing output directory
    pub output: PathBuf,
    /// Pitch handling for every file
    pub mode: PitchMode,
}

/// Check the checkpoint path: it must exist, be a file, and be readable
pub fn validate_model_path(value: &str) -> Result<PathBuf, InferError> {
    let path = PathBuf::from(value);
    if !path.exists() {
        return Err(InferError::PathNotFound(path));
    }
    if !path.is_file() {
        return Err(InferError::NotAFile(path));
    }
    File::open(&path).map_err(|source| InferError::NotReadable {
        path: path.clone(),
        source,
    })?;
    absolute(path)
}

/// Check that a path exists and can be read: files are opened, directories listed
pub fn validate_existing_path(value: &str) -> Result<PathBuf, InferError> {
    let path = PathBuf::from(value);
    if !path.exists() {
        return Err(InferError::PathNotFound(path));
    }
    let readable = if path.is_dir() {
        fs::read_dir(&path).map(drop)
    } else {
        File::open(&path).map(drop)
    };
    if let Err(source) = readable {
        return Err(InferError::NotReadable { path, source });
    }
    absolute(path)
}

fn absolute(path: PathBuf) -> Result<PathBuf, InferError> {
    fs::canonicalize(&path).map_err(|source| InferError::NotReadable { path, source })
}

/// Top-level `*.wav` files of a directory, sorted by path
///
/// The extension match is case-sensitive and subdirectories are not visited.
pub fn collect_wav_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| InferError::NotReadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "wav") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Where the result for `input` lands inside `output_dir`
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    match input.file_name() {
        Some(name) => output_dir.join(name),
        None => output_dir.join("output.wav"),
    }
}

/// Run a request to completion
///
/// The output directory is checked before any file is touched. In directory
/// mode the first failing file aborts the remaining ones.
pub fn run(
    pipeline: &InferencePipeline,
    request: &BatchRequest,
    progress: &ProgressBar,
) -> Result<Vec<InferenceResult>> {
    if !request.output.is_dir() {
        return Err(InferError::OutputNotDirectory(request.output.clone()).into());
    }

    if request.input.is_dir() {
        let files = collect_wav_files(&request.input)?;
        if files.is_empty() {
            warn!("No .wav files found in {:?}", request.input);
        }
        info!("Found {} file(s) in {:?}", files.len(), request.input);

        progress.set_length(files.len() as u64);
        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            if let Some(name) = file.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
            let output = output_path_for(file, &request.output);
            results.push(pipeline.infer(file, output, request.mode)?);
            progress.inc(1);
        }
        progress.finish_with_message("Done");
        Ok(results)
    } else if request.input.is_file() {
        progress.set_length(1);
        let output = output_path_for(&request.input, &request.output);
        let result = pipeline.infer(&request.input, output, request.mode)?;
        progress.inc(1);
        progress.finish_and_clear();
        Ok(vec![result])
    } else {
        Err(InferError::PathNotFound(request.input.clone()).into())
    }
}
