//! Audio output

use anyhow::{Context, Result};
use std::path::Path;

/// Audio output handler
pub struct AudioOutput;

impl AudioOutput {
    /// Save samples as a mono 32-bit float WAV file, replacing any existing file
    pub fn save<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for &sample in samples {
            writer.write_sample(sample)?;
        }

        writer
            .finalize()
            .with_context(|| format!("Failed to finalize WAV file: {:?}", path))?;
        Ok(())
    }
}
