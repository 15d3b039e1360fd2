//! The self-correcting orchestration loop
//!
//! ```text
//! Plan -> EnsureArtifact -> Execute -> Validate -> {Retry -> EnsureArtifact | Terminate}
//! ```
//!
//! - **Plan** reuses a stored artifact when one exists (stubs excluded).
//! - **EnsureArtifact** generates, sanitizes, validates, persists and
//!   registers a new artifact when needed, falling back to the stub when
//!   generation or validation fails.
//! - **Execute** runs the bound artifact in isolation.
//! - **Validate** checks the outcome against the reference, if any.
//! - **Retry/Terminate** is the pure [`decide`] function over [`AttemptState`].
//!
//! Persistence and registration failures abort the run with [`ForgeError`];
//! every other failure is absorbed into diagnostics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use forge_artifact::{ArtifactSource, ArtifactStore, FsArtifactStore, Table, Target};
use forge_codegen::{
    is_stub, sanitize, CodeGenerator, GenerationRequest, GenerationResult, InterfaceContract,
    StubArtifact, SyntaxValidator, ValidationOutcome,
};
use forge_runtime::{
    compare, ArtifactOrigin, ArtifactRegistry, Comparison, ExecutionOutcome, Executor,
    PythonLoader, RegisteredHandle,
};
use tracing::{debug, info, Instrument};
use ulid::Ulid;

use crate::config::{ForgeConfig, RetryPolicy};
use crate::error::ForgeError;
use crate::obs;
use crate::phase::{validate_transition, Phase};
use crate::report::{RunReport, RunResult};
use crate::state::{decide, AttemptState, AttemptVerdict, Decision, DiagnosticKind};

/// Input of one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target: Target,
    pub input: PathBuf,
    /// Reference table; when absent a successful execution passes
    pub expected: Option<Table>,
    /// Ignore the stored artifact for the first attempt
    pub force_regenerate: bool,
}

impl RunRequest {
    /// Request running `target` against `input`
    #[must_use]
    pub fn new(target: Target, input: impl Into<PathBuf>) -> Self {
        Self {
            target,
            input: input.into(),
            expected: None,
            force_regenerate: false,
        }
    }

    /// Compare output against `expected`
    #[must_use]
    pub fn with_expected(mut self, expected: Table) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Regenerate even if an artifact is stored
    #[must_use]
    pub fn with_force_regenerate(mut self, force: bool) -> Self {
        self.force_regenerate = force;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    generation_calls: u32,
    executions: u32,
}

/// Drives runs for any number of targets
///
/// Independent orchestrators may share one registry; a single run is
/// sequential.
pub struct Orchestrator {
    config: ForgeConfig,
    store: Arc<dyn ArtifactStore>,
    generator: Arc<dyn CodeGenerator>,
    registry: Arc<ArtifactRegistry>,
    executor: Executor,
    validator: SyntaxValidator,
    contract: InterfaceContract,
    stub: StubArtifact,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("generator", &self.generator.name())
            .field("registry", &self.registry)
            .field("max_attempts", &self.config.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators
    ///
    /// # Errors
    /// Returns error if `config` is invalid
    pub fn new(
        config: ForgeConfig,
        store: Arc<dyn ArtifactStore>,
        generator: Arc<dyn CodeGenerator>,
        registry: Arc<ArtifactRegistry>,
    ) -> Result<Self, ForgeError> {
        config.validate()?;
        let contract = config.contract();
        let mut executor = Executor::new(config.execution_timeout());
        if config.enforce_columns {
            executor = executor.with_required_columns(contract.columns.clone());
        }
        Ok(Self {
            validator: config.validator(),
            stub: StubArtifact::for_contract(&contract),
            executor,
            contract,
            config,
            store,
            generator,
            registry,
        })
    }

    /// Filesystem store under `config.store_dir` and a Python loader
    ///
    /// # Errors
    /// Returns error if `config` is invalid
    pub fn with_defaults(
        config: ForgeConfig,
        generator: Arc<dyn CodeGenerator>,
    ) -> Result<Self, ForgeError> {
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(&config.store_dir));
        let loader = PythonLoader::new(config.interpreter.clone(), config.contract());
        let registry = Arc::new(ArtifactRegistry::new(Arc::new(loader)));
        Self::new(config, store, generator, registry)
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Shared registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Artifact store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Fallback stub for the configured contract
    #[inline]
    #[must_use]
    pub fn stub(&self) -> &StubArtifact {
        &self.stub
    }

    /// Run the loop for one target and input
    ///
    /// # Errors
    /// Returns error on persistence or registration failure; every other
    /// failure is reported through [`RunResult`]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, ForgeError> {
        let run_id = Ulid::new();
        let span = obs::run_span(run_id, &request.target);
        self.run_inner(run_id, request).instrument(span).await
    }

    /// Like [`Orchestrator::run`], bounded by `run_timeout_secs` when configured
    ///
    /// # Errors
    /// Same as [`Orchestrator::run`], plus [`ForgeError::Timeout`]
    pub async fn run_with_deadline(&self, request: RunRequest) -> Result<RunReport, ForgeError> {
        match self.config.run_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, self.run(request))
                .await
                .map_err(|_| ForgeError::Timeout {
                    duration_secs: deadline.as_secs(),
                })?,
            None => self.run(request).await,
        }
    }

    async fn run_inner(&self, run_id: Ulid, request: RunRequest) -> Result<RunReport, ForgeError> {
        let started_at = Utc::now();
        let target = request.target.clone();
        obs::emit_run_started(
            run_id,
            &target,
            request.force_regenerate,
            self.config.max_attempts,
        );

        let mut state = AttemptState::new(target.clone(), self.config.max_attempts);
        let mut counters = Counters::default();
        let mut last_table: Option<Table> = None;

        let mut phase = Phase::Plan;
        obs::emit_phase_entered(phase, state.attempt);
        let mut active = self.plan(&request)?;

        let result = loop {
            self.enter(&mut phase, Phase::EnsureArtifact, state.attempt)?;
            let handle = match active.take() {
                Some(handle) if !self.needs_generation(&state, &handle) => handle,
                _ => self.ensure_artifact(&mut state, &mut counters).await?,
            };
            state.artifact_origin = Some(handle.origin());

            self.enter(&mut phase, Phase::Execute, state.attempt)?;
            counters.executions += 1;
            let outcome = self.executor.run(&handle, &request.input).await;

            self.enter(&mut phase, Phase::Validate, state.attempt)?;
            match outcome {
                ExecutionOutcome::Failure(reason) => {
                    state.record_failure(DiagnosticKind::Execution, reason);
                }
                ExecutionOutcome::Success(table) => {
                    self.judge(&mut state, &handle, &table, request.expected.as_ref());
                    last_table = Some(table);
                }
            }
            if let Some(diagnostic) = state.diagnostics.last().filter(|_| !is_pass(&state)) {
                obs::emit_attempt_failed(diagnostic.attempt, diagnostic.kind, &diagnostic.message);
            }
            active = Some(handle);

            match decide(&state) {
                Decision::Retry { next_attempt } => {
                    self.enter(&mut phase, Phase::Retry, state.attempt)?;
                    state.advance(next_attempt);
                }
                Decision::Terminate => {
                    self.enter(&mut phase, Phase::Terminate, state.attempt)?;
                    break if is_pass(&state) {
                        RunResult::Passed
                    } else if state.ran_fallback() {
                        RunResult::GenerationFailed(state.diagnostics.clone())
                    } else {
                        RunResult::FailedAfterRetries(state.diagnostics.clone())
                    };
                }
            }
        };

        let finished_at = Utc::now();
        let report = RunReport {
            run_id,
            target,
            attempts: state.attempt + 1,
            generation_calls: counters.generation_calls,
            executions: counters.executions,
            digest: active.as_ref().map(|h| h.digest()),
            origin: active.as_ref().map(|h| h.origin()),
            table: last_table,
            started_at,
            finished_at,
            result,
        };
        obs::emit_run_finished(run_id, &report.result, report.attempts, report.duration_ms());
        Ok(report)
    }

    fn enter(&self, phase: &mut Phase, next: Phase, attempt: u32) -> Result<(), ForgeError> {
        validate_transition(*phase, next)?;
        *phase = next;
        obs::emit_phase_entered(next, attempt);
        Ok(())
    }

    /// Load and bind a usable stored artifact, if any
    fn plan(&self, request: &RunRequest) -> Result<Option<Arc<RegisteredHandle>>, ForgeError> {
        let target = &request.target;
        if request.force_regenerate {
            info!(target = %target, "regeneration forced, ignoring stored artifact");
            return Ok(None);
        }
        if !self.store.exists(target)? {
            debug!(target = %target, "no stored artifact");
            return Ok(None);
        }

        let source = self.store.load(target)?;
        if is_stub(source.text()) {
            info!(target = %target, "stored artifact is a fallback stub, regenerating");
            return Ok(None);
        }

        // one read: the handle returned is the one whose digest was compared
        let bound = self
            .registry
            .lookup(target)
            .ok()
            .filter(|handle| handle.digest() == source.digest());
        obs::emit_artifact_reused(target, source.digest(), bound.is_some());
        let handle = match bound {
            Some(handle) => handle,
            None => self.registry.register(target, &source, ArtifactOrigin::Stored)?,
        };
        Ok(Some(handle))
    }

    fn needs_generation(&self, state: &AttemptState, handle: &RegisteredHandle) -> bool {
        if state.attempt == 0 {
            return false;
        }
        match self.config.retry_policy {
            RetryPolicy::Regenerate => true,
            // a stub can never pass, so reusing it would only burn attempts
            RetryPolicy::ReuseArtifact => handle.is_fallback(),
        }
    }

    /// Generate, sanitize, validate, persist and bind a new artifact, or fall back
    async fn ensure_artifact(
        &self,
        state: &mut AttemptState,
        counters: &mut Counters,
    ) -> Result<Arc<RegisteredHandle>, ForgeError> {
        let target = state.target.clone();
        let mut request = GenerationRequest::new(target.clone(), self.contract.clone());
        if let Some(hint) = state.correction_hint() {
            request = request.with_prior_diagnostic(hint.message.clone());
        }

        counters.generation_calls += 1;
        let timeout = self.config.generation_timeout();
        let result = tokio::time::timeout(timeout, self.generator.generate(&request))
            .await
            .unwrap_or_else(|_| {
                GenerationResult::Failure(format!(
                    "generation timed out after {}s",
                    timeout.as_secs()
                ))
            });

        let raw = match result {
            GenerationResult::Source(raw) => raw,
            GenerationResult::Failure(reason) => {
                state.note(DiagnosticKind::Generation, reason.clone());
                return self.fall_back(&target, state.attempt, &reason);
            }
        };

        let cleaned = sanitize(&raw);
        if let ValidationOutcome::Invalid(diagnostic) = self.validator.validate(&cleaned) {
            state.note(DiagnosticKind::Validation, diagnostic.clone());
            return self.fall_back(&target, state.attempt, &diagnostic);
        }
        if let Err(violation) = self.contract.check(&cleaned) {
            let diagnostic = violation.to_string();
            state.note(DiagnosticKind::Validation, diagnostic.clone());
            return self.fall_back(&target, state.attempt, &diagnostic);
        }

        // the loader runs before anything is persisted so a rejection leaves
        // the store and the registry agreeing on the previous artifact
        let prepared = self
            .registry
            .prepare(&target, &ArtifactSource::new(cleaned.as_str()))?;
        let source = self.store.save(&target, &cleaned)?;
        let handle = self.registry.commit(prepared, ArtifactOrigin::Generated);
        obs::emit_artifact_generated(
            &target,
            source.digest(),
            state.attempt,
            &self.store.locate(&target),
        );
        Ok(handle)
    }

    fn fall_back(
        &self,
        target: &Target,
        attempt: u32,
        reason: &str,
    ) -> Result<Arc<RegisteredHandle>, ForgeError> {
        obs::emit_artifact_fallback(target, attempt, reason);
        let source = self.store.save(target, &self.stub.source(target))?;
        Ok(self.registry.bind_stub(target, &source, &self.stub))
    }

    fn judge(
        &self,
        state: &mut AttemptState,
        handle: &RegisteredHandle,
        table: &Table,
        expected: Option<&Table>,
    ) {
        if handle.is_fallback() {
            state.record_failure(
                DiagnosticKind::Stub,
                "fallback stub produced a placeholder table",
            );
            return;
        }
        match expected.map(|expected| compare(table, expected, &self.config.compare)) {
            Some(Comparison::Mismatch(diff)) => state.record_failure(DiagnosticKind::Mismatch, diff),
            Some(Comparison::Match) | None => state.record_pass(),
        }
    }
}

fn is_pass(state: &AttemptState) -> bool {
    state.last_outcome == Some(AttemptVerdict::Passed)
}

/// Run the artifact stored for `target` without generation or validation
///
/// # Errors
/// Returns error if the target is not bound in `registry`
pub async fn execute_stored(
    registry: &ArtifactRegistry,
    executor: &Executor,
    target: &Target,
    input: &Path,
) -> Result<ExecutionOutcome, ForgeError> {
    let handle = registry.lookup(target)?;
    Ok(executor.run(&handle, input).await)
}
