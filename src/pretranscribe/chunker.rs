// Speech-gated segmentation of live audio into overlapping chunks
//
// Uses energy-based (RMS) detection per frame, the same approach as the
// end-of-speech detector in recording: a chunk closes when enough speech
// has accumulated and the speaker pauses, at the step cadence, or at the
// hard length cap. The tail of each emitted chunk is carried into the next
// one so the transcript merger can reconcile boundary words.

/// Frame length used for speech/silence classification
const FRAME_MS: u64 = 20;

/// Configuration for the speech chunker
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub sample_rate: u32,
    /// Target cadence of chunk emission during continuous speech
    pub step_ms: u64,
    /// Tail carried into the next chunk
    pub overlap_ms: u64,
    /// Hard cap on chunk length
    pub max_chunk_ms: u64,
    /// Minimum accumulated speech before a chunk may close
    pub min_speech_ms: u64,
    /// Trailing silence that closes a chunk early
    pub end_silence_ms: u64,
    /// RMS threshold below which a frame is silent
    pub silence_threshold: f32,
}

/// One segment of audio ready for chunk transcription
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Monotonic emission index; results are merged in this order
    pub index: usize,
    pub samples: Vec<f32>,
}

/// Incremental segmenter fed with live capture samples
pub struct SpeechChunker {
    config: ChunkerConfig,
    /// Samples not yet forming a complete classification frame
    pending: Vec<f32>,
    /// Current chunk under construction (includes the carried overlap)
    buffer: Vec<f32>,
    speech_ms: u64,
    trailing_silence_ms: u64,
    next_index: usize,
}

impl SpeechChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            buffer: Vec::new(),
            speech_ms: 0,
            trailing_silence_ms: 0,
            next_index: 0,
        }
    }

    fn frame_len(&self) -> usize {
        (self.config.sample_rate as u64 * FRAME_MS / 1000) as usize
    }

    fn buffer_ms(&self) -> u64 {
        self.buffer.len() as u64 * 1000 / self.config.sample_rate as u64
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }

    /// Feed captured samples; returns any chunks that became ready.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        self.pending.extend_from_slice(samples);

        let frame_len = self.frame_len();
        let mut ready = Vec::new();

        while self.pending.len() >= frame_len {
            let frame: Vec<f32> = self.pending.drain(..frame_len).collect();
            let is_speech = Self::rms(&frame) >= self.config.silence_threshold;

            self.buffer.extend_from_slice(&frame);
            if is_speech {
                self.speech_ms += FRAME_MS;
                self.trailing_silence_ms = 0;
            } else {
                self.trailing_silence_ms += FRAME_MS;
            }

            if let Some(chunk) = self.check_emit() {
                ready.push(chunk);
            }
        }

        ready
    }

    fn check_emit(&mut self) -> Option<AudioChunk> {
        let has_min_speech = self.speech_ms >= self.config.min_speech_ms;
        let buffer_ms = self.buffer_ms();

        if has_min_speech && self.trailing_silence_ms >= self.config.end_silence_ms {
            return Some(self.emit());
        }

        if buffer_ms >= self.config.max_chunk_ms {
            if has_min_speech {
                return Some(self.emit());
            }
            // A capful of silence carries no speech worth transcribing
            self.retain_overlap();
            return None;
        }

        if buffer_ms >= self.config.step_ms && has_min_speech {
            return Some(self.emit());
        }

        None
    }

    fn emit(&mut self) -> AudioChunk {
        let chunk = AudioChunk {
            index: self.next_index,
            samples: self.buffer.clone(),
        };
        self.next_index += 1;
        self.retain_overlap();
        chunk
    }

    fn retain_overlap(&mut self) {
        let overlap_len =
            (self.config.sample_rate as u64 * self.config.overlap_ms / 1000) as usize;
        if overlap_len > 0 && self.buffer.len() > overlap_len {
            self.buffer.drain(..self.buffer.len() - overlap_len);
        } else if overlap_len == 0 {
            self.buffer.clear();
        }
        self.speech_ms = 0;
        self.trailing_silence_ms = 0;
    }

    /// Close the stream; returns a final chunk when any speech is pending.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            if Self::rms(&rest) >= self.config.silence_threshold {
                self.speech_ms += rest.len() as u64 * 1000 / self.config.sample_rate as u64;
            }
            self.buffer.extend_from_slice(&rest);
        }

        if self.speech_ms == 0 || self.buffer.is_empty() {
            return None;
        }
        Some(self.emit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerConfig {
        ChunkerConfig {
            sample_rate: 16_000,
            step_ms: 200,
            overlap_ms: 40,
            max_chunk_ms: 400,
            min_speech_ms: 60,
            end_silence_ms: 60,
            silence_threshold: 0.01,
        }
    }

    fn speech(ms: u64) -> Vec<f32> {
        vec![0.5; (16 * ms) as usize]
    }

    fn silence(ms: u64) -> Vec<f32> {
        vec![0.0; (16 * ms) as usize]
    }

    #[test]
    fn test_silence_produces_no_chunks() {
        let mut chunker = SpeechChunker::new(config());
        assert!(chunker.push(&silence(300)).is_empty());
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn test_speech_then_pause_emits_one_chunk() {
        let mut chunker = SpeechChunker::new(config());
        let mut chunks = chunker.push(&speech(100));
        chunks.extend(chunker.push(&silence(100)));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        // 100ms speech + 60ms of the silence that closed it
        assert_eq!(chunks[0].samples.len(), 16 * 160);
    }

    #[test]
    fn test_continuous_speech_emits_at_step_cadence() {
        let mut chunker = SpeechChunker::new(config());
        let chunks = chunker.push(&speech(450));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_overlap_is_carried_into_next_chunk() {
        let mut chunker = SpeechChunker::new(config());
        let chunks = chunker.push(&speech(450));
        assert!(chunks.len() >= 2);

        let overlap_len = 16 * 40;
        let first_tail = &chunks[0].samples[chunks[0].samples.len() - overlap_len..];
        let second_head = &chunks[1].samples[..overlap_len];
        assert_eq!(first_tail, second_head);
    }

    #[test]
    fn test_long_silence_never_grows_unbounded() {
        let mut chunker = SpeechChunker::new(config());
        // Push far more silence than the max chunk cap
        for _ in 0..10 {
            assert!(chunker.push(&silence(200)).is_empty());
        }
        // Buffer was repeatedly trimmed to the overlap tail
        assert!(chunker.buffer.len() <= 16 * 400);
    }

    #[test]
    fn test_flush_emits_trailing_speech() {
        let mut chunker = SpeechChunker::new(config());
        // Above min speech but below step and without an end-silence pause
        assert!(chunker.push(&speech(80)).is_empty());

        let last = chunker.flush().expect("trailing speech should flush");
        assert_eq!(last.index, 0);
    }

    #[test]
    fn test_flush_after_emission_without_new_speech_is_none() {
        let mut chunker = SpeechChunker::new(config());
        let mut chunks = chunker.push(&speech(100));
        chunks.extend(chunker.push(&silence(100)));
        assert_eq!(chunks.len(), 1);

        assert!(chunker.flush().is_none());
    }

    #[test]
    fn test_quiet_audio_counts_as_silence() {
        let mut chunker = SpeechChunker::new(config());
        let quiet = vec![0.001; 16 * 300];
        assert!(chunker.push(&quiet).is_empty());
        assert!(chunker.flush().is_none());
    }
}
