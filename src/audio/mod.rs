// Audio capture collaborator contract
//
// Capture hardware and DSP live outside the orchestration core; the core
// only needs to start/stop/discard a recording and receive pushed PCM
// chunks and level telemetry while it runs.

pub mod wav;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

/// Sample rate every capture implementation delivers to the core
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Enhancement chain applied by the capture service while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementMode {
    Off,
    Webrtc,
}

impl EnhancementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhancementMode::Off => "off",
            EnhancementMode::Webrtc => "webrtc",
        }
    }
}

/// Audio-processing profile an inference request runs under.
///
/// The fast profile favors latency and is used for the first pass; the
/// quality profile is used by the background refinement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioProfile {
    Fast,
    Quality,
}

impl AudioProfile {
    /// Wire value for the backend's `inference_audio_profile` field
    pub fn wire_profile(&self) -> &'static str {
        match self {
            AudioProfile::Fast => "standard",
            AudioProfile::Quality => "quality",
        }
    }

    /// Wire value for the backend's `enhancement_mode` field
    pub fn wire_enhancement_mode(&self) -> &'static str {
        match self {
            AudioProfile::Fast => "fast_dsp",
            AudioProfile::Quality => "quality_dsp",
        }
    }
}

/// Errors from the audio capture collaborator
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AudioCaptureError {
    #[error("no audio input device available: {0}")]
    DeviceUnavailable(String),
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture already running")]
    AlreadyRecording,
    #[error("no capture running")]
    NotRecording,
    #[error("audio I/O error: {0}")]
    Io(String),
}

/// Level telemetry callback (RMS per pushed chunk)
pub type LevelCallback = Box<dyn Fn(f32) + Send + Sync>;

/// Push sinks wired into a capture session at start.
///
/// `samples` feeds the pretranscription session; `level` feeds UI metering.
/// Either may be absent. Send failures on a closed sample channel are
/// expected after promote/cancel and must be ignored by implementations.
pub struct CaptureSinks {
    pub samples: Option<mpsc::Sender<Vec<f32>>>,
    pub level: Option<LevelCallback>,
}

impl CaptureSinks {
    pub fn none() -> Self {
        Self {
            samples: None,
            level: None,
        }
    }
}

/// Reference to a finished recording on disk
#[derive(Debug, Clone, PartialEq)]
pub struct AudioReference {
    /// 16 kHz mono PCM16 WAV
    pub wav_path: PathBuf,
    pub sample_count: u64,
    pub sample_rate: u32,
}

impl AudioReference {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }

    /// Remove the backing temp file. Missing files are not an error; cancel
    /// paths may race with cleanup.
    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.wav_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                crate::warn!(
                    "[audio] Failed to remove temp audio {}: {}",
                    self.wav_path.display(),
                    e
                );
            }
        }
    }

    /// Copy the backing file so a background pass can outlive the original.
    pub fn retain_copy(&self, dest: &Path) -> std::io::Result<AudioReference> {
        std::fs::copy(&self.wav_path, dest)?;
        Ok(AudioReference {
            wav_path: dest.to_path_buf(),
            sample_count: self.sample_count,
            sample_rate: self.sample_rate,
        })
    }
}

/// Audio capture service consumed by the controller.
///
/// One recording at a time; `stop_recording` finalizes the temp WAV and
/// returns its reference, `discard` drops an in-progress capture without
/// producing a file. Both must drop the capture sinks so the sample
/// channel closes and downstream consumers can drain.
#[async_trait]
pub trait AudioCaptureService: Send + Sync {
    fn start_recording(
        &self,
        enhancement: EnhancementMode,
        sinks: CaptureSinks,
    ) -> Result<(), AudioCaptureError>;

    async fn stop_recording(&self) -> Result<AudioReference, AudioCaptureError>;

    /// Abandon the in-progress capture and its temp file. Idempotent.
    fn discard(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_sample_count() {
        let audio = AudioReference {
            wav_path: PathBuf::from("/tmp/a.wav"),
            sample_count: 32_000,
            sample_rate: TARGET_SAMPLE_RATE,
        };
        assert!((audio.duration_secs() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duration_zero_sample_rate() {
        let audio = AudioReference {
            wav_path: PathBuf::from("/tmp/a.wav"),
            sample_count: 100,
            sample_rate: 0,
        };
        assert_eq!(audio.duration_secs(), 0.0);
    }

    #[test]
    fn test_remove_missing_file_is_silent() {
        let audio = AudioReference {
            wav_path: PathBuf::from("/tmp/ghosttype-definitely-missing.wav"),
            sample_count: 0,
            sample_rate: TARGET_SAMPLE_RATE,
        };
        audio.remove();
    }

    #[test]
    fn test_profile_wire_values() {
        assert_eq!(AudioProfile::Fast.wire_profile(), "standard");
        assert_eq!(AudioProfile::Quality.wire_profile(), "quality");
        assert_eq!(AudioProfile::Fast.wire_enhancement_mode(), "fast_dsp");
    }

    #[test]
    fn test_retain_copy_duplicates_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        std::fs::write(&src, b"RIFFdata").unwrap();
        let audio = AudioReference {
            wav_path: src,
            sample_count: 4,
            sample_rate: TARGET_SAMPLE_RATE,
        };

        let copy = audio
            .retain_copy(&dir.path().join("copy.wav"))
            .unwrap();
        assert!(copy.wav_path.exists());
        assert_eq!(copy.sample_count, 4);

        audio.remove();
        assert!(copy.wav_path.exists(), "copy outlives the original");
    }
}
