//! WAV clip decoding, plus a float WAV writer for building corpora.

use std::path::Path;

use super::AudioDecoder;
use crate::{Error, Result};

/// Write interleaved f32 samples as a WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
    num_channels: u16,
) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: num_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| Error::decode(path, e))?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Decodes `[offset, offset + duration)` of a WAV file, down-mixed to mono.
///
/// No resampling: the file's native rate is returned as-is and the caller
/// rejects a mismatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(
        &self,
        path: &Path,
        offset: f64,
        duration: Option<f64>,
        _target_rate: u32,
    ) -> Result<(Vec<f32>, u32)> {
        let mut reader = hound::WavReader::open(path).map_err(|e| Error::decode(path, e))?;
        let spec = reader.spec();
        let rate = spec.sample_rate;
        let channels = spec.channels.max(1) as usize;

        let total_frames = reader.duration();
        let start = (offset * rate as f64).round() as u64;
        if start > total_frames as u64 {
            return Err(Error::decode(
                path,
                format!("offset {offset}s is past the end of a {total_frames}-frame file"),
            ));
        }
        reader
            .seek(start as u32)
            .map_err(|e| Error::decode(path, e))?;

        let max_frames = match duration {
            Some(d) => (d * rate as f64).round() as usize,
            None => usize::MAX,
        };
        let interleaved = collect_samples(reader, max_frames.saturating_mul(channels))
            .map_err(|e| Error::decode(path, e))?;

        Ok((downmix(&interleaved, channels), rate))
    }
}

fn collect_samples<R: std::io::Read>(
    reader: hound::WavReader<R>,
    limit: usize,
) -> std::result::Result<Vec<f32>, hound::Error> {
    let spec = reader.spec();
    match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().take(limit).collect(),
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .take(limit)
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect()
        }
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_clip_with_offset_and_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let ramp: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
        write_wav(&path, &ramp, 1000, 1).unwrap();

        let (clip, rate) = WavDecoder.decode(&path, 0.1, Some(0.25), 1000).unwrap();
        assert_eq!(rate, 1000);
        assert_eq!(clip.len(), 250);
        assert!((clip[0] - 0.1).abs() < 1e-6);
        assert!((clip[249] - 0.349).abs() < 1e-6);
    }

    #[test]
    fn test_decode_without_duration_reads_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.wav");
        write_wav(&path, &[0.1f32; 100], 1000, 1).unwrap();
        let (clip, _) = WavDecoder.decode(&path, 0.04, None, 1000).unwrap();
        assert_eq!(clip.len(), 60);
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, &[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 8000, 2).unwrap();
        let (clip, rate) = WavDecoder.decode(&path, 0.0, None, 8000).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(clip, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_decode_missing_file_is_decode_error() {
        let err = WavDecoder
            .decode(Path::new("/nonexistent/clip.wav"), 0.0, None, 16000)
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_decode_offset_past_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, &[0.0f32; 10], 1000, 1).unwrap();
        assert!(WavDecoder.decode(&path, 5.0, None, 1000).is_err());
    }
}
