// Dual-pass quality refinement for dictation
//
// The fast-profile pass is delivered immediately; a background pass re-runs
// the same request with the quality audio profile over a retained copy of
// the audio. When the normalized outputs differ and auto-replace is on, the
// delivered text is replaced in place, but only while the original target
// application is still foregrounded.

use super::{EngineEventSink, RecordingSessionController};
use crate::audio::{AudioProfile, AudioReference};
use crate::context::TargetWindow;
use crate::events::RefinementReplacedPayload;
use crate::executor::InferenceOutcome;
use crate::provider::InferenceRequest;
use crate::routing::{self, RoutePlan};
use crate::session::{RecordingSession, SessionId, WorkflowMode};
use crate::text;
use futures_util::future::{AbortHandle, Abortable};
use std::sync::Arc;

/// Cancellation handle for a scheduled quality pass
pub struct RefinementHandle {
    abort: AbortHandle,
}

impl RefinementHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl<E: EngineEventSink + 'static> RecordingSessionController<E> {
    /// Dictate mode on an all-local route with audio enhancement active.
    pub(super) fn refinement_eligible(&self, plan: &RoutePlan, request: &InferenceRequest) -> bool {
        request.mode == WorkflowMode::Dictate
            && request.config.refinement.enabled
            && request.config.audio_enhancement_enabled
            && plan.asr_is_local()
            && plan.llm_is_local()
    }

    /// Retain a copy of the recording and run the quality pass in the
    /// background. The pass is cancellable independently of the main
    /// inference and is cancelled when a new recording starts.
    pub(super) fn schedule_refinement(
        self: &Arc<Self>,
        session: &RecordingSession,
        request: &InferenceRequest,
        audio: &AudioReference,
        target: Option<TargetWindow>,
        outcome: &InferenceOutcome,
    ) {
        let copy_path = match crate::paths::ensure_scratch_dir() {
            Ok(dir) => dir.join(format!("refine-{}.wav", session.id)),
            Err(e) => {
                crate::warn!("[refinement] No scratch dir, skipping quality pass: {}", e);
                audio.remove();
                return;
            }
        };
        let retained = match audio.retain_copy(&copy_path) {
            Ok(retained) => retained,
            Err(e) => {
                crate::warn!("[refinement] Audio retain failed, skipping quality pass: {}", e);
                audio.remove();
                return;
            }
        };
        audio.remove();

        let mut quality_request = request.clone();
        quality_request.audio = Some(retained.clone());
        quality_request.audio_profile = AudioProfile::Quality;

        let (abort, registration) = AbortHandle::new_pair();
        let controller = self.clone();
        let session_id = session.id;
        let first_output = outcome.output_text.clone();
        let task = Abortable::new(
            async move {
                controller
                    .run_refinement(session_id, quality_request, first_output, target)
                    .await;
            },
            registration,
        );
        tokio::spawn(async move {
            let _ = task.await;
            retained.remove();
        });

        self.inner.lock().refinement = Some(RefinementHandle { abort });
        crate::info!("[refinement] Quality pass scheduled for session {}", session_id);
    }

    async fn run_refinement(
        self: Arc<Self>,
        session_id: SessionId,
        request: InferenceRequest,
        first_output: String,
        target: Option<TargetWindow>,
    ) {
        let plan = routing::plan(&request.config);
        let silent = |_: &str| {};

        let result = if request.config.llm_rewrite_enabled {
            self.executor.execute(&plan, &request, None, &silent).await
        } else {
            self.executor.transcribe_only(&plan, &request, None).await
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancellation() => {
                crate::debug!("[refinement] Quality pass cancelled");
                return;
            }
            Err(e) => {
                // Absorbed: the fast-pass output stands
                crate::warn!("[refinement] Quality pass failed: {}", e);
                return;
            }
        };

        let rule = request.config.refinement.normalization;
        if text::effectively_unchanged(&first_output, &outcome.output_text, rule) {
            crate::info!("[refinement] Outputs effectively unchanged, keeping delivered text");
            return;
        }
        if !request.config.refinement.auto_replace {
            crate::info!("[refinement] Auto-replace disabled, keeping delivered text");
            return;
        }
        let Some(target) = target else {
            crate::debug!("[refinement] No target window captured, cannot replace");
            return;
        };
        if !self.delivery.is_target_foreground(&target) {
            crate::info!("[refinement] Target no longer foregrounded, skipping replacement");
            return;
        }

        match self.delivery.replace_text(&target, &outcome.output_text) {
            Ok(()) => {
                crate::info!("[refinement] Replaced delivered text for session {}", session_id);
                self.emitter
                    .emit_refinement_replaced(RefinementReplacedPayload {
                        session_id,
                        output_text: outcome.output_text,
                    });
            }
            Err(e) => crate::warn!("[refinement] Replacement failed: {}", e),
        }
    }

    pub(super) fn cancel_refinement(&self) {
        if let Some(handle) = self.inner.lock().refinement.take() {
            crate::debug!("[controller] Cancelling pending quality refinement");
            handle.cancel();
        }
    }
}
