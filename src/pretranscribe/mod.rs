// Incremental per-recording ASR pipeline
//
// Transcribes audio chunks while the user is still speaking so the
// full-pipeline latency at stop time shrinks to roughly one chunk. Bound
// 1:1 to a recording session; exactly one of finish/cancel may be called.

mod chunker;
mod merge;

pub use chunker::{AudioChunk, ChunkerConfig, SpeechChunker};
pub use merge::TranscriptMerger;

use crate::audio::AudioReference;
use crate::provider::ProviderError;
use crate::session::SessionId;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// What to do when too many chunk requests failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackPolicy {
    /// Return the merged chunk transcript regardless of failures
    None,
    /// Re-transcribe the whole recording in one request when the chunk
    /// failure rate exceeds the threshold
    FullAsrOnHighFailure,
}

/// Pretranscription tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PretranscriptionConfig {
    pub enabled: bool,
    pub step_ms: u64,
    pub overlap_ms: u64,
    pub max_chunk_ms: u64,
    pub min_speech_ms: u64,
    pub end_silence_ms: u64,
    pub silence_threshold: f32,
    /// Bound on concurrent chunk requests (back-pressure, not fan-out)
    pub max_in_flight: usize,
    pub fallback_policy: FallbackPolicy,
    /// Chunk failure rate above which the fallback policy applies
    pub failure_rate_threshold: f32,
}

impl Default for PretranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            step_ms: 3_000,
            overlap_ms: 400,
            max_chunk_ms: 15_000,
            min_speech_ms: 600,
            end_silence_ms: 500,
            silence_threshold: 0.01,
            max_in_flight: 2,
            fallback_policy: FallbackPolicy::FullAsrOnHighFailure,
            failure_rate_threshold: 0.34,
        }
    }
}

impl PretranscriptionConfig {
    fn chunker_config(&self, sample_rate: u32) -> ChunkerConfig {
        ChunkerConfig {
            sample_rate,
            step_ms: self.step_ms,
            overlap_ms: self.overlap_ms,
            max_chunk_ms: self.max_chunk_ms,
            min_speech_ms: self.min_speech_ms,
            end_silence_ms: self.end_silence_ms,
            silence_threshold: self.silence_threshold,
        }
    }
}

/// Runtime snapshot emitted after each state change. The snapshot contract
/// is part of this component's interface; its consumer is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub status: String,
    pub completed_chunks: u32,
    pub queued_chunks: u32,
    pub last_chunk_latency_ms: Option<u64>,
}

/// Caller-supplied per-chunk ASR function
pub type ChunkTranscriber =
    Arc<dyn Fn(AudioChunk) -> BoxFuture<'static, Result<String, ProviderError>> + Send + Sync>;

/// Caller-supplied full-recording ASR function for the fallback path
pub type FullAudioTranscriber = Arc<
    dyn Fn(AudioReference) -> BoxFuture<'static, Result<String, ProviderError>> + Send + Sync,
>;

/// Receives runtime snapshots
pub type SnapshotCallback = Arc<dyn Fn(RuntimeSnapshot) + Send + Sync>;

/// Result of finishing a pretranscription session
#[derive(Debug, Clone, PartialEq)]
pub struct PretranscriptionOutcome {
    pub transcript: String,
    /// True when the full-audio fallback superseded the chunked transcript
    pub fallback_used: bool,
    pub completed_chunks: u32,
    pub failed_chunks: u32,
    pub low_confidence_merges: u32,
}

struct ChunkedOutcome {
    transcript: String,
    completed: u32,
    failed: u32,
    low_confidence: u32,
}

impl ChunkedOutcome {
    fn empty() -> Self {
        Self {
            transcript: String::new(),
            completed: 0,
            failed: 0,
            low_confidence: 0,
        }
    }
}

/// One incremental ASR pipeline, bound to a recording session id
pub struct PretranscriptionSession {
    session_id: SessionId,
    config: PretranscriptionConfig,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    worker: JoinHandle<ChunkedOutcome>,
}

impl PretranscriptionSession {
    /// Start the pipeline over a live sample channel.
    ///
    /// The channel sender is held by the audio side; dropping it (at stop
    /// time) closes the input and lets `finish` drain in-flight chunks.
    pub fn spawn(
        session_id: SessionId,
        config: PretranscriptionConfig,
        sample_rate: u32,
        samples_rx: mpsc::Receiver<Vec<f32>>,
        transcribe: ChunkTranscriber,
        snapshot: SnapshotCallback,
    ) -> Self {
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker_state = Worker {
            config: config.clone(),
            chunker: SpeechChunker::new(config.chunker_config(sample_rate)),
            transcribe,
            snapshot,
            semaphore: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            tasks: JoinSet::new(),
            results: BTreeMap::new(),
            completed: 0,
            failed: 0,
            in_flight: 0,
            last_latency_ms: None,
        };

        let worker = tokio::spawn(worker_loop(
            worker_state,
            samples_rx,
            cancel.clone(),
            cancelled.clone(),
        ));

        crate::info!("[pretranscribe] Session started for {}", session_id);
        Self {
            session_id,
            config,
            cancel,
            cancelled,
            worker,
        }
    }

    /// The recording session this pipeline belongs to. Always equals the id
    /// it was created for.
    pub fn id(&self) -> SessionId {
        self.session_id
    }

    /// Abandon all in-flight chunk requests; no further results are merged.
    pub fn cancel(self) {
        crate::info!("[pretranscribe] Session {} cancelled", self.session_id);
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    /// Wait for the pipeline to drain and return the final transcript.
    ///
    /// The sample sender must be dropped before calling this, otherwise the
    /// worker keeps waiting for input. When the chunk failure rate exceeds
    /// the configured threshold and a full-audio transcriber was supplied,
    /// the whole recording is re-transcribed and that result supersedes the
    /// chunked transcript.
    pub async fn finish(
        self,
        final_audio: Option<&AudioReference>,
        full_transcriber: Option<FullAudioTranscriber>,
    ) -> PretranscriptionOutcome {
        let chunked = match self.worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                crate::warn!("[pretranscribe] Worker task failed: {}", e);
                ChunkedOutcome::empty()
            }
        };

        let attempted = chunked.completed + chunked.failed;
        let failure_rate = if attempted == 0 {
            0.0
        } else {
            chunked.failed as f32 / attempted as f32
        };

        let fallback_applies = self.config.fallback_policy == FallbackPolicy::FullAsrOnHighFailure
            && attempted > 0
            && failure_rate > self.config.failure_rate_threshold;

        if fallback_applies {
            if let (Some(audio), Some(full)) = (final_audio, full_transcriber) {
                crate::info!(
                    "[pretranscribe] Chunk failure rate {:.0}% over threshold, re-transcribing full audio",
                    failure_rate * 100.0
                );
                match full(audio.clone()).await {
                    Ok(text) => {
                        return PretranscriptionOutcome {
                            transcript: text,
                            fallback_used: true,
                            completed_chunks: chunked.completed,
                            failed_chunks: chunked.failed,
                            low_confidence_merges: chunked.low_confidence,
                        };
                    }
                    Err(e) => {
                        crate::warn!(
                            "[pretranscribe] Full-audio fallback failed, keeping chunked transcript: {}",
                            e
                        );
                    }
                }
            }
        }

        PretranscriptionOutcome {
            transcript: chunked.transcript,
            fallback_used: false,
            completed_chunks: chunked.completed,
            failed_chunks: chunked.failed,
            low_confidence_merges: chunked.low_confidence,
        }
    }
}

struct Worker {
    config: PretranscriptionConfig,
    chunker: SpeechChunker,
    transcribe: ChunkTranscriber,
    snapshot: SnapshotCallback,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<(usize, Result<String, ProviderError>, u64)>,
    results: BTreeMap<usize, String>,
    completed: u32,
    failed: u32,
    in_flight: u32,
    last_latency_ms: Option<u64>,
}

impl Worker {
    fn emit_snapshot(&self, status: &str) {
        (self.snapshot)(RuntimeSnapshot {
            status: status.to_string(),
            completed_chunks: self.completed,
            queued_chunks: self.in_flight,
            last_chunk_latency_ms: self.last_latency_ms,
        });
    }

    /// Submit one chunk, waiting for an in-flight slot (back-pressure).
    /// Returns false when cancellation arrived while waiting.
    async fn submit(&mut self, chunk: AudioChunk, cancel: &Notify) -> bool {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
            _ = cancel.notified() => return false,
        };

        let transcribe = self.transcribe.clone();
        let index = chunk.index;
        crate::debug!(
            "[pretranscribe] Submitting chunk {} ({} samples)",
            index,
            chunk.samples.len()
        );
        self.tasks.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let result = transcribe(chunk).await;
            (index, result, started.elapsed().as_millis() as u64)
        });
        self.in_flight += 1;
        self.emit_snapshot("transcribing");
        true
    }

    fn record(&mut self, joined: Result<(usize, Result<String, ProviderError>, u64), JoinError>) {
        match joined {
            Ok((index, Ok(text), latency_ms)) => {
                self.completed += 1;
                self.last_latency_ms = Some(latency_ms);
                self.results.insert(index, text);
            }
            Ok((index, Err(e), latency_ms)) => {
                // Chunk failures are absorbed; only the aggregate fallback
                // decision is surfaced.
                self.failed += 1;
                self.last_latency_ms = Some(latency_ms);
                crate::debug!("[pretranscribe] Chunk {} failed: {}", index, e);
            }
            Err(e) => {
                self.failed += 1;
                crate::warn!("[pretranscribe] Chunk task panicked: {}", e);
            }
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        self.emit_snapshot("transcribing");
    }

    fn into_cancelled(mut self) -> ChunkedOutcome {
        self.tasks.abort_all();
        self.emit_snapshot("cancelled");
        ChunkedOutcome::empty()
    }

    fn into_outcome(self) -> ChunkedOutcome {
        let mut merger = TranscriptMerger::new(self.config.overlap_ms > 0);
        for text in self.results.values() {
            merger.push(text);
        }
        self.emit_snapshot("done");
        ChunkedOutcome {
            transcript: merger.text().to_string(),
            completed: self.completed,
            failed: self.failed,
            low_confidence: merger.low_confidence_merges(),
        }
    }
}

async fn worker_loop(
    mut worker: Worker,
    mut samples_rx: mpsc::Receiver<Vec<f32>>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
) -> ChunkedOutcome {
    worker.emit_snapshot("listening");

    loop {
        if cancelled.load(Ordering::SeqCst) {
            return worker.into_cancelled();
        }

        tokio::select! {
            maybe_samples = samples_rx.recv() => {
                match maybe_samples {
                    Some(samples) => {
                        for chunk in worker.chunker.push(&samples) {
                            if !worker.submit(chunk, &cancel).await {
                                return worker.into_cancelled();
                            }
                        }
                    }
                    // Sender dropped: recording stopped, move to draining
                    None => break,
                }
            }
            Some(joined) = worker.tasks.join_next(), if !worker.tasks.is_empty() => {
                worker.record(joined);
            }
            _ = cancel.notified() => {
                return worker.into_cancelled();
            }
        }
    }

    if let Some(chunk) = worker.chunker.flush() {
        if !worker.submit(chunk, &cancel).await {
            return worker.into_cancelled();
        }
    }
    worker.emit_snapshot("finishing");

    loop {
        tokio::select! {
            joined = worker.tasks.join_next() => {
                match joined {
                    Some(joined) => worker.record(joined),
                    None => break,
                }
            }
            _ = cancel.notified() => {
                return worker.into_cancelled();
            }
        }
    }

    worker.into_outcome()
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
