use std::fs::File;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::resampler;
use crate::error::DecodeError;
use crate::logging::OperationTimer;

const SLOW_DECODE: Duration = Duration::from_millis(500);

/// A fully decoded clip: interleaved stereo at the output rate
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedClip {
    /// Wrap interleaved stereo samples already at `sample_rate`
    pub fn from_stereo(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// What a probe learns about a file without decoding it
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub duration: Option<Duration>,
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, DecodeError> {
    let file = File::open(path)
        .map_err(|e| DecodeError::DecodeFailed(format!("Failed to open file: {}", e)))?;
    let media_source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat {
            format: format!("{}: {}", path.display(), e),
        })?;

    Ok(probed.format)
}

/// Check that `path` holds a decodable audio track
pub fn probe(path: &Path) -> Result<ClipInfo, DecodeError> {
    let format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat {
            format: "No audio track found".to_string(),
        })?;

    // Fails early for codecs the registry does not know.
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat {
            format: format!("{}", e),
        })?;

    let params = &track.codec_params;
    let sample_rate = params.sample_rate.unwrap_or(44_100);
    let duration = params
        .n_frames
        .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));

    Ok(ClipInfo {
        sample_rate,
        channels: params.channels.map(|c| c.count()).unwrap_or(2),
        duration,
    })
}

/// Decode the whole file into stereo f32 at `output_rate`
pub fn decode_clip(path: &Path, output_rate: u32) -> Result<DecodedClip, DecodeError> {
    let timer = OperationTimer::new(format!("decode {}", path.display()));
    let mut format = open_format(path)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat {
            format: "No audio track found".to_string(),
        })?;
    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::DecodeFailed(format!("Failed to create decoder: {}", e)))?;

    let mut interleaved = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::CorruptedFile(format!("Failed to read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(DecodeError::DecodeFailed(format!("Failed to decode packet: {}", e))),
        };

        let spec = *decoded.spec();
        source_rate = spec.rate;
        channels = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(sample_buf.samples());
    }

    let stereo = resampler::to_stereo(&interleaved, channels);
    let samples = resampler::resample(&stereo, 2, source_rate, output_rate);
    if samples.is_empty() {
        return Err(DecodeError::CorruptedFile(format!(
            "{} contains no audio",
            path.display()
        )));
    }

    let clip = DecodedClip::from_stereo(samples, output_rate);
    let elapsed = timer.finish_with_threshold(SLOW_DECODE);
    debug!(
        "Decoded {} ({:.1}s of audio) in {}ms",
        path.display(),
        clip.duration().as_secs_f64(),
        elapsed.as_millis()
    );
    Ok(clip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Minimal 16-bit PCM WAV writer for decoder tests
    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let mut file = File::create(path).unwrap();
        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVEfmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap();
        file.write_all(&channels.to_le_bytes()).unwrap();
        file.write_all(&sample_rate.to_le_bytes()).unwrap();
        file.write_all(&(sample_rate * channels as u32 * 2).to_le_bytes()).unwrap();
        file.write_all(&(channels * 2).to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        for sample in samples {
            file.write_all(&sample.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_probe_reads_stream_parameters() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tone.wav");
        write_wav(&path, 8_000, 1, &vec![1000; 8_000]);

        let info = probe(&path).unwrap();
        assert_eq!(info.sample_rate, 8_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_decode_converts_to_stereo_at_output_rate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tone.wav");
        write_wav(&path, 8_000, 1, &vec![16384; 8_000]);

        let clip = decode_clip(&path, 16_000).unwrap();
        assert_eq!(clip.sample_rate(), 16_000);
        assert_eq!(clip.frames(), 16_000);
        assert!((clip.samples()[0] - 0.5).abs() < 0.01);
        assert_eq!(clip.samples()[0], clip.samples()[1]);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("noise.mp3");
        std::fs::write(&path, b"this is not audio").unwrap();

        assert!(probe(&path).is_err());
        assert!(decode_clip(&path, 48_000).is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = probe(Path::new("/nonexistent/rain.flac"));
        assert!(matches!(result, Err(DecodeError::DecodeFailed(_))));
    }

    #[test]
    fn test_clip_duration() {
        let clip = DecodedClip::from_stereo(vec![0.0; 96_000], 48_000);
        assert_eq!(clip.frames(), 48_000);
        assert_eq!(clip.duration(), Duration::from_secs(1));
        assert_eq!(DecodedClip::from_stereo(Vec::new(), 0).duration(), Duration::ZERO);
    }
}
