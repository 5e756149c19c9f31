// Recording session controller
//
// Top-level state machine owning one voice workflow at a time:
// start/stop/promote a mode, bind a pretranscription session, hand off to
// the streaming executor and deliver the result exactly once. All state
// transitions go through one mutex; every asynchronous completion compares
// its captured session/inference id against the active one before applying
// effects, which is the sole cancellation mechanism.

mod refinement;

pub use refinement::RefinementHandle;

use crate::audio::{
    AudioCaptureService, AudioProfile, AudioReference, CaptureSinks, EnhancementMode,
};
use crate::backend::BackendHandle;
use crate::context::{DictationContextResolver, ResolvedPreset, TargetWindow, WindowContextSource};
use crate::delivery::{DeliverySink, HistoryRecord, HistoryStore};
use crate::error::{EngineError, EngineStage, TimeoutKind};
use crate::events::{
    current_timestamp, ConfigurationPromptPayload, InferenceCompletedPayload,
    InferenceEventEmitter, InferenceFailedPayload, InferenceStartedPayload,
    PretranscriptionEventEmitter, RecordingCancelledPayload, RecordingErrorPayload,
    RecordingEventEmitter, RecordingStartedPayload, RecordingStoppedPayload, StreamDeltaPayload,
};
use crate::executor::{InferenceOutcome, StreamingInferenceExecutor};
use crate::pretranscribe::{
    AudioChunk, ChunkTranscriber, FullAudioTranscriber, PretranscriptionSession, SnapshotCallback,
};
use crate::provider::{ChunkRequest, InferenceRequest, ProviderError};
use crate::routing::{self, RoutePlan};
use crate::session::{InferenceId, RecordingSession, SessionTracker, WorkflowMode};
use crate::settings::EngineSettings;
use crate::text::StreamTextAccumulator;
use crate::watchdog::InferenceWatchdog;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Marker bound for the event sink the controller is generic over
pub trait EngineEventSink:
    RecordingEventEmitter + InferenceEventEmitter + PretranscriptionEventEmitter + Send + Sync
{
}

impl<T> EngineEventSink for T where
    T: RecordingEventEmitter + InferenceEventEmitter + PretranscriptionEventEmitter + Send + Sync
{
}

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Recording,
    Stopping,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ControllerState {
    /// Busy states reject a new start (Processing turns it into a cancel)
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ControllerState::Recording | ControllerState::Stopping | ControllerState::Processing
        )
    }
}

/// Buffer size of the live sample channel feeding pretranscription
const SAMPLE_CHANNEL_CAPACITY: usize = 64;

struct ControllerInner {
    state: ControllerState,
    session: Option<RecordingSession>,
    active_inference: Option<InferenceId>,
    /// Per-stop request id guarding against duplicate/concurrent stops
    stop_request: Option<Uuid>,
    target_window: Option<TargetWindow>,
    preset: Option<ResolvedPreset>,
    selected_text: Option<String>,
    pretranscription: Option<PretranscriptionSession>,
    accumulator: StreamTextAccumulator,
    refinement: Option<RefinementHandle>,
    status_message: Option<String>,
}

impl ControllerInner {
    fn reset_transient(&mut self) {
        self.session = None;
        self.active_inference = None;
        self.stop_request = None;
        self.target_window = None;
        self.preset = None;
        self.selected_text = None;
        self.accumulator.reset();
    }
}

/// Top-level orchestration state machine
pub struct RecordingSessionController<E: EngineEventSink + 'static> {
    audio: Arc<dyn AudioCaptureService>,
    executor: Arc<StreamingInferenceExecutor>,
    backend: Option<BackendHandle>,
    resolver: Arc<dyn DictationContextResolver>,
    windows: Arc<dyn WindowContextSource>,
    delivery: Arc<dyn DeliverySink>,
    history: Arc<dyn HistoryStore>,
    tracker: Arc<SessionTracker>,
    watchdog: Arc<InferenceWatchdog>,
    emitter: Arc<E>,
    settings: RwLock<EngineSettings>,
    inner: Mutex<ControllerInner>,
}

impl<E: EngineEventSink + 'static> RecordingSessionController<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        audio: Arc<dyn AudioCaptureService>,
        executor: Arc<StreamingInferenceExecutor>,
        backend: Option<BackendHandle>,
        resolver: Arc<dyn DictationContextResolver>,
        windows: Arc<dyn WindowContextSource>,
        delivery: Arc<dyn DeliverySink>,
        history: Arc<dyn HistoryStore>,
        emitter: Arc<E>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            audio,
            executor,
            backend,
            resolver,
            windows,
            delivery,
            history,
            tracker: Arc::new(SessionTracker::new()),
            watchdog: Arc::new(InferenceWatchdog::new()),
            emitter,
            settings: RwLock::new(settings),
            inner: Mutex::new(ControllerInner {
                state: ControllerState::Idle,
                session: None,
                active_inference: None,
                stop_request: None,
                target_window: None,
                preset: None,
                selected_text: None,
                pretranscription: None,
                accumulator: StreamTextAccumulator::new(),
                refinement: None,
                status_message: None,
            }),
        });

        // Weak reference: the watchdog lives inside the controller, so its
        // handler must not keep the controller alive.
        let weak = Arc::downgrade(&controller);
        controller.watchdog.set_handler(Arc::new(move |inference_id, kind| {
            if let Some(controller) = weak.upgrade() {
                controller.on_watchdog_timeout(inference_id, kind);
            }
        }));

        controller
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn status_message(&self) -> Option<String> {
        self.inner.lock().status_message.clone()
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> EngineSettings {
        self.settings.read().clone()
    }

    /// Replace settings. In-flight inferences keep their locked snapshot.
    pub fn set_settings(&self, settings: EngineSettings) {
        *self.settings.write() = settings;
    }

    /// Start a recording workflow.
    ///
    /// No-op while recording or stopping; while an inference is running a
    /// start triggers cancellation of that inference instead.
    pub fn start(self: &Arc<Self>, mode: WorkflowMode) -> Result<(), EngineError> {
        {
            let inner = self.inner.lock();
            match inner.state {
                ControllerState::Recording | ControllerState::Stopping => {
                    crate::debug!("[controller] Start ignored, already {:?}", inner.state);
                    return Ok(());
                }
                ControllerState::Processing => {
                    drop(inner);
                    crate::info!("[controller] Start while inference running, cancelling it");
                    self.cancel("New recording requested");
                    return Ok(());
                }
                _ => {}
            }
        }

        // A new recording invalidates any pending quality pass
        self.cancel_refinement();

        let settings = self.settings();
        let target_window = self.windows.foreground_window();
        let selected_text = self.windows.selected_text();
        let preset = if mode == WorkflowMode::Dictate {
            self.resolver.resolve(target_window.as_ref())
        } else {
            None
        };

        let session = RecordingSession::new(mode);
        crate::info!("[controller] Starting {} session {}", mode, session.id);

        let mut sinks = CaptureSinks::none();
        let mut pretranscription = None;
        if settings.pretranscription.enabled {
            if let Some(transcribe) = self.chunk_transcriber(&settings) {
                let (samples_tx, samples_rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
                let emitter = self.emitter.clone();
                let session_id = session.id;
                let snapshot: SnapshotCallback = Arc::new(move |snap| {
                    emitter.emit_pretranscription_snapshot(session_id, snap);
                });
                pretranscription = Some(PretranscriptionSession::spawn(
                    session.id,
                    settings.pretranscription.clone(),
                    crate::audio::TARGET_SAMPLE_RATE,
                    samples_rx,
                    transcribe,
                    snapshot,
                ));
                sinks.samples = Some(samples_tx);
            }
        }

        let enhancement = if settings.audio_enhancement_enabled {
            settings.enhancement_mode
        } else {
            EnhancementMode::Off
        };
        if let Err(e) = self.audio.start_recording(enhancement, sinks) {
            if let Some(session) = pretranscription {
                session.cancel();
            }
            let error = EngineError::RecordingFailure(e.to_string());
            self.emitter.emit_recording_error(RecordingErrorPayload {
                message: error.user_message(),
            });
            return Err(error);
        }

        // Warm the backend in the background when a local stage will need it
        let plan = routing::plan(&settings);
        if plan.needs_local_backend()
            || (settings.pretranscription.enabled && settings.asr_engine.is_local())
        {
            if let Some(backend) = self.backend.clone() {
                let asr_model = settings.asr_model.clone();
                let llm_model = settings.llm_model.clone();
                tokio::spawn(async move {
                    if let Err(e) = backend.start_if_needed(&asr_model, &llm_model).await {
                        crate::warn!("[controller] Backend warm-up failed: {}", e);
                    }
                });
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.state = ControllerState::Recording;
            inner.session = Some(session.clone());
            inner.target_window = target_window;
            inner.selected_text = selected_text;
            inner.preset = preset;
            inner.pretranscription = pretranscription;
            inner.status_message = None;
            inner.stop_request = None;
            inner.accumulator.reset();
        }

        self.emitter.emit_recording_started(RecordingStartedPayload {
            session_id: session.id,
            mode,
            timestamp: current_timestamp(),
        });
        Ok(())
    }

    /// Switch workflow mode mid-recording without restarting capture.
    ///
    /// Cancels (and does not restart) the pretranscription session when the
    /// mode actually changes; full-audio ASR runs at stop time instead.
    pub fn promote(&self, from: WorkflowMode, to: WorkflowMode) {
        let mut inner = self.inner.lock();
        if inner.state != ControllerState::Recording {
            crate::debug!("[controller] Promote ignored, not recording");
            return;
        }
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if session.mode != from {
            crate::debug!(
                "[controller] Promote ignored, active mode is {} not {}",
                session.mode,
                from
            );
            return;
        }
        if from == to {
            return;
        }

        crate::info!("[controller] Promoting session from {} to {}", from, to);
        session.mode = to;

        if let Some(pretranscription) = inner.pretranscription.take() {
            pretranscription.cancel();
        }

        if to == WorkflowMode::Dictate {
            inner.preset = self.resolver.resolve(inner.target_window.as_ref());
        } else {
            inner.preset = None;
        }
    }

    /// Stop recording and run the inference pipeline to completion.
    ///
    /// Only valid when `mode` matches the active session's mode and the
    /// controller is recording; duplicate and concurrent stops are rejected
    /// by a per-stop request id.
    pub async fn stop(self: &Arc<Self>, mode: WorkflowMode) -> Result<(), EngineError> {
        let stop_id = Uuid::new_v4();
        let session = {
            let mut inner = self.inner.lock();
            if inner.state != ControllerState::Recording {
                crate::debug!("[controller] Stop ignored, not recording");
                return Ok(());
            }
            let Some(session) = inner.session.clone() else {
                return Ok(());
            };
            if session.mode != mode {
                crate::debug!(
                    "[controller] Stop ignored, active mode is {} not {}",
                    session.mode,
                    mode
                );
                return Ok(());
            }
            if inner.stop_request.is_some() {
                crate::debug!("[controller] Duplicate stop ignored");
                return Ok(());
            }
            inner.stop_request = Some(stop_id);
            inner.state = ControllerState::Stopping;
            session
        };

        crate::info!("[controller] Stopping session {}", session.id);
        let started = Instant::now();
        let audio_result = self.audio.stop_recording().await;

        // Cancel may have interleaved with audio finalization
        let pretranscription = {
            let mut inner = self.inner.lock();
            if inner.stop_request != Some(stop_id) || inner.state != ControllerState::Stopping {
                crate::debug!("[controller] Stop superseded during audio finalization");
                if let Ok(audio) = &audio_result {
                    audio.remove();
                }
                return Ok(());
            }
            inner.pretranscription.take()
        };

        let audio = match audio_result {
            Ok(audio) => audio,
            Err(e) => {
                if let Some(session) = pretranscription {
                    session.cancel();
                }
                let error = EngineError::RecordingFailure(e.to_string());
                self.fail_session(&error);
                return Err(error);
            }
        };

        self.emitter.emit_recording_stopped(RecordingStoppedPayload {
            session_id: session.id,
            duration_secs: audio.duration_secs(),
            timestamp: current_timestamp(),
        });

        // Abnormal stop (no frames captured) returns to idle, not failed
        if audio.sample_count == 0 {
            crate::info!("[controller] No audio captured, returning to idle");
            if let Some(session) = pretranscription {
                session.cancel();
            }
            audio.remove();
            self.reset_to_idle();
            self.emitter
                .emit_recording_cancelled(RecordingCancelledPayload {
                    reason: "No audio captured".to_string(),
                    timestamp: current_timestamp(),
                });
            return Ok(());
        }

        // Lock the route and configuration for this inference
        let config = self.settings();
        let plan = routing::plan(&config);

        let pretranscript = match pretranscription {
            Some(pre_session) => {
                let full = self.full_audio_transcriber(&config);
                let outcome = pre_session.finish(Some(&audio), full).await;
                crate::info!(
                    "[controller] Pretranscription finished: {} ok, {} failed, fallback={}, low-confidence merges={}",
                    outcome.completed_chunks,
                    outcome.failed_chunks,
                    outcome.fallback_used,
                    outcome.low_confidence_merges
                );
                let transcript = outcome.transcript.trim().to_string();
                if transcript.is_empty() {
                    None
                } else {
                    Some(transcript)
                }
            }
            None => None,
        };

        // Re-check ownership after the pretranscription drain
        let (preset, selected_text) = {
            let inner = self.inner.lock();
            if inner.stop_request != Some(stop_id) || inner.state != ControllerState::Stopping {
                crate::debug!("[controller] Stop superseded during pretranscription drain");
                audio.remove();
                return Ok(());
            }
            (inner.preset.clone(), inner.selected_text.clone())
        };

        // At most one inference per session
        if !self.tracker.register_inference_start(session.id) {
            crate::warn!(
                "[controller] Inference already started for session {}",
                session.id
            );
            audio.remove();
            return Ok(());
        }

        let inference_id = InferenceId::new();
        let request = InferenceRequest {
            mode: session.mode,
            audio: Some(audio.clone()),
            selected_text: selected_text.unwrap_or_default(),
            preset,
            audio_profile: AudioProfile::Fast,
            config: config.clone(),
        };

        {
            let mut inner = self.inner.lock();
            if inner.stop_request != Some(stop_id) || inner.state != ControllerState::Stopping {
                audio.remove();
                return Ok(());
            }
            inner.state = ControllerState::Processing;
            inner.active_inference = Some(inference_id);
            inner.accumulator.reset();
        }
        self.emitter.emit_inference_started(InferenceStartedPayload {
            session_id: session.id,
            inference_id,
            mode: session.mode,
            hybrid: plan.is_hybrid(),
            timestamp: current_timestamp(),
        });

        // Local stages need the backend healthy before the first request
        if plan.needs_local_backend() {
            if let Some(backend) = &self.backend {
                if let Err(e) = backend
                    .start_if_needed(&config.asr_model, &config.llm_model)
                    .await
                {
                    let error = EngineError::BackendUnavailable(e.to_string());
                    audio.remove();
                    self.apply_failure(inference_id, &error);
                    return Err(error);
                }
            }
        }

        self.watchdog.arm(
            inference_id,
            TimeoutKind::FirstToken,
            config
                .watchdog
                .budget_for(TimeoutKind::FirstToken, plan.needs_local_backend()),
        );

        let result = self
            .run_inference(inference_id, &plan, &request, pretranscript.as_deref())
            .await;
        self.watchdog.clear();

        match result {
            Ok(outcome) => {
                self.finalize_success(inference_id, &session, &plan, &request, audio, outcome, started)
                    .await;
                Ok(())
            }
            Err(error) if error.is_cancellation() => {
                // Benign: unwind silently. If the cancel path already reset
                // state, leave its terminal state in place.
                audio.remove();
                let mut inner = self.inner.lock();
                if inner.active_inference == Some(inference_id) {
                    inner.reset_transient();
                    inner.state = ControllerState::Idle;
                }
                Ok(())
            }
            Err(error) => {
                audio.remove();
                self.apply_failure(inference_id, &error);
                Err(error)
            }
        }
    }

    /// Cancel the active workflow from any non-idle state. Safe to call
    /// reentrantly and concurrently with an in-flight stop.
    pub fn cancel(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if !inner.state.is_busy() {
            crate::debug!("[controller] Cancel ignored in state {:?}", inner.state);
            return;
        }

        crate::info!("[controller] Cancelling (reason: {})", reason);

        // 1. Stop audio capture and discard its temp file
        self.audio.discard();

        // 2. Cancel any pretranscription session
        if let Some(session) = inner.pretranscription.take() {
            session.cancel();
        }

        // 3. Terminate any running provider stream
        self.executor.terminate_all();

        // 4. Clear the watchdog
        self.watchdog.clear();

        // 5. Reset transient state; dropping the active ids makes every
        //    in-flight completion stale
        inner.reset_transient();
        inner.state = ControllerState::Cancelled;
        inner.status_message = Some(reason.to_string());
        drop(inner);

        self.emitter
            .emit_recording_cancelled(RecordingCancelledPayload {
                reason: reason.to_string(),
                timestamp: current_timestamp(),
            });
    }

    /// Full shutdown variant of cancel used on process exit.
    pub fn terminate(&self) {
        crate::info!("[controller] Terminating");
        self.cancel("Shutting down");
        self.cancel_refinement();
        self.tracker.reset();
    }

    async fn run_inference(
        self: &Arc<Self>,
        inference_id: InferenceId,
        plan: &RoutePlan,
        request: &InferenceRequest,
        pretranscript: Option<&str>,
    ) -> Result<InferenceOutcome, EngineError> {
        let bypass =
            request.mode == WorkflowMode::Dictate && !request.config.llm_rewrite_enabled;
        if bypass {
            crate::info!("[controller] LLM rewrite disabled, running ASR-only bypass");
            return self
                .executor
                .transcribe_only(plan, request, pretranscript)
                .await;
        }

        let controller = self.clone();
        let watchdog = self.watchdog.clone();
        let stall_budget = request
            .config
            .watchdog
            .budget_for(TimeoutKind::Stall, plan.needs_local_backend());
        let on_token = move |token: &str| {
            controller.on_stream_token(inference_id, token);
            watchdog.arm(inference_id, TimeoutKind::Stall, stall_budget);
        };

        self.executor
            .execute(plan, request, pretranscript, &on_token)
            .await
    }

    /// Merge one streamed token and publish the running text. Stale tokens
    /// (from a superseded inference) are dropped.
    fn on_stream_token(&self, inference_id: InferenceId, token: &str) {
        let text = {
            let mut inner = self.inner.lock();
            if inner.active_inference != Some(inference_id) {
                return;
            }
            match inner.accumulator.ingest(token) {
                crate::text::MergeAction::Ignore => return,
                _ => inner.accumulator.text().to_string(),
            }
        };
        self.emitter.emit_stream_delta(StreamDeltaPayload {
            inference_id,
            text,
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_success(
        self: &Arc<Self>,
        inference_id: InferenceId,
        session: &RecordingSession,
        plan: &RoutePlan,
        request: &InferenceRequest,
        audio: AudioReference,
        outcome: InferenceOutcome,
        started: Instant,
    ) {
        let target_window = {
            let mut inner = self.inner.lock();
            if inner.active_inference != Some(inference_id) {
                crate::debug!("[controller] Stale completion dropped");
                audio.remove();
                return;
            }
            let target = inner.target_window.clone();
            inner.reset_transient();
            inner.state = ControllerState::Completed;
            target
        };

        // Exactly one paste and one history record per session id, however
        // many completion paths race here.
        if self.tracker.register_paste(session.id) {
            if let Err(e) = self
                .delivery
                .paste_text(target_window.as_ref(), &outcome.output_text)
            {
                crate::warn!("[controller] Paste failed: {}", e);
            }
        } else {
            crate::debug!("[controller] Paste already performed for session");
        }

        if self.tracker.register_history_insert(session.id) {
            let record = HistoryRecord::new(
                session.mode,
                outcome.meta.raw_text.clone(),
                outcome.output_text.clone(),
            );
            if let Err(e) = self.history.append(record).await {
                crate::warn!("[controller] History write failed: {}", e);
            }
        }

        self.emitter
            .emit_inference_completed(InferenceCompletedPayload {
                session_id: session.id,
                mode: session.mode,
                raw_text: outcome.meta.raw_text.clone(),
                output_text: outcome.output_text.clone(),
                used_web_search: outcome.meta.used_web_search,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        crate::info!(
            "[controller] Session {} completed in {}ms",
            session.id,
            started.elapsed().as_millis()
        );

        if self.refinement_eligible(plan, request) {
            self.schedule_refinement(session, request, &audio, target_window, &outcome);
        } else {
            audio.remove();
        }
    }

    /// Apply a terminal failure if the inference is still the active one.
    fn apply_failure(&self, inference_id: InferenceId, error: &EngineError) {
        {
            let mut inner = self.inner.lock();
            if inner.active_inference != Some(inference_id) {
                crate::debug!("[controller] Stale failure dropped: {}", error);
                return;
            }
            if let Some(session) = inner.pretranscription.take() {
                session.cancel();
            }
            inner.reset_transient();
            inner.state = ControllerState::Failed;
            inner.status_message = Some(error.user_message());
        }
        self.watchdog.clear();

        if let EngineError::CredentialsMissing { stage } = error {
            let stage_name = match stage {
                EngineStage::Asr => "asr",
                EngineStage::Llm => "llm",
            };
            self.emitter
                .emit_configuration_prompt(ConfigurationPromptPayload {
                    stage: stage_name.to_string(),
                    message: error.user_message(),
                });
        }
        self.emitter.emit_inference_failed(InferenceFailedPayload {
            message: error.user_message(),
        });

        // Full reset so the next start is unaffected by this failure
        self.tracker.reset();
    }

    /// Failure before an inference id existed (audio finalization).
    fn fail_session(&self, error: &EngineError) {
        {
            let mut inner = self.inner.lock();
            inner.reset_transient();
            inner.state = ControllerState::Failed;
            inner.status_message = Some(error.user_message());
        }
        self.watchdog.clear();
        self.emitter.emit_inference_failed(InferenceFailedPayload {
            message: error.user_message(),
        });
        self.tracker.reset();
    }

    fn reset_to_idle(&self) {
        let mut inner = self.inner.lock();
        inner.reset_transient();
        inner.state = ControllerState::Idle;
        inner.status_message = None;
    }

    /// Watchdog firings unwind exactly like a user cancel, but surface a
    /// timeout message instead of returning silently to idle.
    fn on_watchdog_timeout(&self, inference_id: InferenceId, kind: TimeoutKind) {
        let error = EngineError::WatchdogTimeout(kind);
        {
            let inner = self.inner.lock();
            if inner.active_inference != Some(inference_id) {
                crate::debug!("[controller] Stale watchdog firing ignored");
                return;
            }
        }
        crate::warn!("[controller] Watchdog timeout: {}", kind);
        self.apply_failure(inference_id, &error);
        self.executor.terminate_all();
        self.audio.discard();
    }

    /// Per-chunk ASR function bound to the engine selected at recording
    /// start. Returns None when no provider can serve chunks (pretranscribe
    /// is skipped rather than failing the recording).
    fn chunk_transcriber(&self, settings: &EngineSettings) -> Option<ChunkTranscriber> {
        if !settings.asr_engine.is_local()
            && !settings
                .cloud
                .api_key
                .as_deref()
                .is_some_and(|k| !k.is_empty())
        {
            crate::debug!(
                "[controller] Cloud ASR selected without credentials, skipping pretranscription"
            );
            return None;
        }
        let provider = match self.executor.provider_for(settings.asr_engine) {
            Ok(provider) => provider,
            Err(e) => {
                crate::warn!("[controller] No chunk ASR provider: {}", e);
                return None;
            }
        };
        let config = settings.clone();

        Some(Arc::new(move |chunk: AudioChunk| {
            let provider = provider.clone();
            let config = config.clone();
            async move {
                let dir = crate::paths::ensure_scratch_dir()
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;
                let path = dir.join(format!("chunk-{}-{}.wav", Uuid::new_v4(), chunk.index));
                crate::audio::wav::write_wav_mono_16k(&path, &chunk.samples)
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;

                let result = provider
                    .transcribe_chunk(&ChunkRequest {
                        wav_path: path.clone(),
                        audio_profile: AudioProfile::Fast,
                        config,
                    })
                    .await;

                if let Err(e) = std::fs::remove_file(&path) {
                    crate::trace!("[controller] Chunk wav cleanup failed: {}", e);
                }
                result.map(|transcript| transcript.text)
            }
            .boxed()
        }))
    }

    /// Full-recording ASR used by the pretranscription fallback policy.
    fn full_audio_transcriber(&self, settings: &EngineSettings) -> Option<FullAudioTranscriber> {
        let provider = self.executor.provider_for(settings.asr_engine).ok()?;
        let config = settings.clone();
        Some(Arc::new(move |audio: AudioReference| {
            let provider = provider.clone();
            let config = config.clone();
            async move {
                provider
                    .transcribe_chunk(&ChunkRequest {
                        wav_path: audio.wav_path,
                        audio_profile: AudioProfile::Fast,
                        config,
                    })
                    .await
                    .map(|transcript| transcript.text)
            }
            .boxed()
        }))
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
