//! Structured lifecycle events for orchestrator runs
//!
//! - Run-scoped tracing spans via [`run_span`], attached with `Instrument`
//! - `emit_*` functions for lifecycle events, each tagged with an `event` field
//!
//! Events are emitted at `info!` level except failures, which use `warn!`.

use std::fmt::Display;

use forge_artifact::{ContentHash, Target};
use tracing::{info, warn};
use ulid::Ulid;

use crate::phase::Phase;
use crate::state::DiagnosticKind;

/// Span tagged with the run id and target
#[must_use]
pub fn run_span(run_id: Ulid, target: &Target) -> tracing::Span {
    tracing::info_span!("forge.run", run_id = %run_id, target = %target)
}

/// Emit event: run started
pub fn emit_run_started(run_id: Ulid, target: &Target, force_regenerate: bool, max_attempts: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        target = %target,
        force_regenerate,
        max_attempts,
    );
}

/// Emit event: phase entered
pub fn emit_phase_entered(phase: Phase, attempt: u32) {
    info!(event = "phase.entered", phase = %phase, attempt);
}

/// Emit event: a generated artifact was persisted and registered
pub fn emit_artifact_generated(target: &Target, digest: ContentHash, attempt: u32, location: &str) {
    info!(
        event = "artifact.generated",
        target = %target,
        digest = %digest.short(),
        attempt,
        location = %location,
    );
}

/// Emit event: the fallback stub was bound
pub fn emit_artifact_fallback(target: &Target, attempt: u32, reason: &str) {
    warn!(
        event = "artifact.fallback",
        target = %target,
        attempt,
        reason = %reason,
    );
}

/// Emit event: an existing artifact was reused
pub fn emit_artifact_reused(target: &Target, digest: ContentHash, already_bound: bool) {
    info!(
        event = "artifact.reused",
        target = %target,
        digest = %digest.short(),
        already_bound,
    );
}

/// Emit event: an attempt failed
pub fn emit_attempt_failed(attempt: u32, kind: DiagnosticKind, message: &str) {
    warn!(
        event = "attempt.failed",
        attempt,
        kind = %kind,
        message = %message,
    );
}

/// Emit event: run finished
pub fn emit_run_finished(run_id: Ulid, result: &dyn Display, attempts: u32, duration_ms: i64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        result = %result,
        attempts,
        duration_ms,
    );
}
