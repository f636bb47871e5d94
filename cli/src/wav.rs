use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported WAV format: {bits} bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },

    #[error("Input is {actual}Hz but the radio is running at {expected}Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("Telemetry filler did not deliver frame {0} in time")]
    FillerStalled(u64),
}

/// Read a WAV file as mono f32 samples. Multi-channel files use the first
/// channel.
pub fn read_mono(path: &Path, expected_rate: u32) -> Result<Vec<f32>, CliError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    println!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    if spec.sample_rate != expected_rate {
        return Err(CliError::SampleRateMismatch {
            expected: expected_rate,
            actual: spec.sample_rate,
        });
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (format, bits) => return Err(CliError::UnsupportedFormat { bits, format }),
    };

    let channels = spec.channels.max(1) as usize;
    Ok(interleaved.into_iter().step_by(channels).collect())
}

pub struct MonoWriter {
    writer: WavWriter<BufWriter<File>>,
}

impl MonoWriter {
    /// 32 bit float output, so clipping in the chain shows up in the file
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, CliError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
        })
    }

    pub fn write(&mut self, samples: &[f32]) -> Result<(), CliError> {
        for &s in samples {
            self.writer.write_sample(s)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<(), CliError> {
        self.writer.finalize()?;
        Ok(())
    }
}
