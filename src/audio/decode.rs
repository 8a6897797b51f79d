use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AnalysisError, AnalysisResult};

/// Decoded mono signal. Immutable once built; clones share the sample storage.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Arc<[f64]>,
    pub sample_rate: f64,
}

impl AudioData {
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.samples.len() as f64 / self.sample_rate
        } else {
            0.0
        }
    }
}

pub fn decode_audio(path: &Path) -> AnalysisResult<AudioData> {
    let file = std::fs::File::open(path)
        .map_err(|e| AnalysisError::decode(path, format!("failed to open file: {e}")))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AnalysisError::decode(path, format!("failed to probe format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::decode(path, "no audio tracks found"))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AnalysisError::decode(path, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::decode(path, format!("failed to create decoder: {e}")))?;

    let mut all_samples: Vec<f64> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(AnalysisError::decode(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(AnalysisError::decode(path, e)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f64>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        downmix_into(&mut all_samples, sample_buf.samples(), channels);
    }

    let audio = AudioData::new(all_samples, sample_rate as f64);
    log::info!(
        "Decoded audio: {} frames, {}Hz, {} channel(s), {:.1}s",
        audio.samples.len(),
        sample_rate,
        channels,
        audio.duration_secs()
    );

    Ok(audio)
}

/// Averages each interleaved frame into one mono sample.
fn downmix_into(out: &mut Vec<f64>, interleaved: &[f64], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64),
    );
}
