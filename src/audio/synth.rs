use std::f64::consts::PI;
use std::path::Path;

use crate::error::{AnalysisError, AnalysisResult};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Test tone: one full-scale sine per channel.
#[derive(Clone, Debug)]
pub struct ToneSpec {
    pub duration_secs: f64,
    pub sample_rate: u32,
    /// Frequency in Hz for each channel, in channel order.
    pub frequencies: Vec<f64>,
}

impl ToneSpec {
    fn validate(&self) -> AnalysisResult<()> {
        if self.frequencies.is_empty() {
            return Err(AnalysisError::invalid("at least one frequency is required"));
        }
        if self.frequencies.len() > u16::MAX as usize {
            return Err(AnalysisError::invalid(format!(
                "too many channels: {}",
                self.frequencies.len()
            )));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(AnalysisError::invalid(format!(
                "duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.sample_rate == 0 {
            return Err(AnalysisError::invalid("sample rate must be positive"));
        }
        if let Some(f) = self.frequencies.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
            return Err(AnalysisError::invalid(format!(
                "frequencies must be positive, got {f}"
            )));
        }
        Ok(())
    }

    pub fn total_frames(&self) -> usize {
        (self.duration_secs * self.sample_rate as f64) as usize
    }
}

/// Writes `spec` as 16-bit little-endian PCM WAV.
pub fn generate_tone(path: &Path, spec: &ToneSpec) -> AnalysisResult<()> {
    spec.validate()?;

    let wav_spec = hound::WavSpec {
        channels: spec.frequencies.len() as u16,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let write_err = |e: hound::Error| AnalysisError::output(path, e);

    let mut writer = hound::WavWriter::create(path, wav_spec).map_err(write_err)?;
    let rate = spec.sample_rate as f64;
    for i in 0..spec.total_frames() {
        for &freq in &spec.frequencies {
            let angle = 2.0 * PI * freq * i as f64 / rate;
            let sample = (angle.sin() * i16::MAX as f64) as i16;
            writer.write_sample(sample).map_err(write_err)?;
        }
    }
    writer.finalize().map_err(write_err)?;

    log::info!(
        "Wrote {:.2}s test tone ({} channel(s), {}Hz) to {}",
        spec.duration_secs,
        spec.frequencies.len(),
        spec.sample_rate,
        path.display()
    );
    Ok(())
}
