// WAV encoding for chunk handoff to the backend
//
// The backend's transcription routes take a path to a 16 kHz mono PCM16
// WAV, so pretranscription chunks are written to scratch files before each
// request.

use super::TARGET_SAMPLE_RATE;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavEncodingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Write f32 samples in [-1.0, 1.0] as a 16 kHz mono PCM16 WAV.
pub fn write_wav_mono_16k(path: &Path, samples: &[f32]) -> Result<(), WavEncodingError> {
    if samples.is_empty() {
        return Err(WavEncodingError::InvalidInput(
            "no samples to encode".to_string(),
        ));
    }
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(WavEncodingError::InvalidInput(
            "samples contain NaN or infinity".to_string(),
        ));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| WavEncodingError::Encoding(e.to_string()))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| WavEncodingError::Encoding(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| WavEncodingError::Encoding(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_empty_samples_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_wav_mono_16k(&dir.path().join("empty.wav"), &[]);
        assert!(matches!(result, Err(WavEncodingError::InvalidInput(_))));
    }

    #[test]
    fn test_write_nan_samples_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_wav_mono_16k(&dir.path().join("nan.wav"), &[0.1, f32::NAN]);
        assert!(matches!(result, Err(WavEncodingError::InvalidInput(_))));
    }

    #[test]
    fn test_write_produces_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..1600)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();

        write_wav_mono_16k(&path, &samples).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hot.wav");
        write_wav_mono_16k(&path, &[2.0, -2.0]).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let values: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(values[0], i16::MAX);
        assert_eq!(values[1], -i16::MAX);
    }
}
