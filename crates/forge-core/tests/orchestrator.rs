//! End-to-end runs of the orchestration loop with scripted collaborators

use std::sync::Arc;
use std::time::Duration;

use forge_artifact::{ArtifactSource, ArtifactStore, MemoryArtifactStore};
use forge_codegen::{is_stub, GenerationResult, InterfaceContract, StubArtifact};
use forge_core::{
    DiagnosticKind, ForgeConfig, ForgeError, Orchestrator, RetryPolicy, RunRequest, RunResult,
    MAX_ATTEMPTS,
};
use forge_runtime::{ArtifactOrigin, ArtifactRegistry};
use forge_test_utils::{
    completion, failing_parser_source, panicking_parser_source, parser_source, sample_table,
    target, wrong_table, FailingStore, FakeLoader, ScriptedGenerator,
};
use pretty_assertions::assert_eq;

const INPUT: &str = "data/icici/icici_sample.pdf";

struct Fixture {
    store: Arc<MemoryArtifactStore>,
    generator: Arc<ScriptedGenerator>,
    loader: Arc<FakeLoader>,
    registry: Arc<ArtifactRegistry>,
    orchestrator: Orchestrator,
}

impl Fixture {
    fn new(store: MemoryArtifactStore, generator: ScriptedGenerator) -> Self {
        Self::with_config(store, generator, ForgeConfig::default())
    }

    fn with_config(
        store: MemoryArtifactStore,
        generator: ScriptedGenerator,
        config: ForgeConfig,
    ) -> Self {
        let store = Arc::new(store);
        let generator = Arc::new(generator);
        let loader = Arc::new(FakeLoader::new());
        let registry = Arc::new(ArtifactRegistry::new(loader.clone()));
        let orchestrator =
            Orchestrator::new(config, store.clone(), generator.clone(), registry.clone()).unwrap();
        Self {
            store,
            generator,
            loader,
            registry,
            orchestrator,
        }
    }
}

fn expecting_sample(name: &str) -> RunRequest {
    RunRequest::new(target(name), INPUT).with_expected(sample_table())
}

fn kinds(result: &RunResult) -> Vec<DiagnosticKind> {
    result.diagnostics().iter().map(|d| d.kind).collect()
}

#[tokio::test]
async fn stored_artifact_passes_without_generation() {
    let store = MemoryArtifactStore::new().with_artifact(target("icici"), &parser_source(&sample_table()));
    let fx = Fixture::new(store, ScriptedGenerator::default());

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert_eq!(report.result, RunResult::Passed);
    assert_eq!(report.generation_calls, 0);
    assert_eq!(report.executions, 1);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.origin, Some(ArtifactOrigin::Stored));
    assert_eq!(report.table, Some(sample_table()));
    assert_eq!(fx.generator.calls(), 0);
}

#[tokio::test]
async fn missing_artifact_is_generated_persisted_and_bound() {
    let source = parser_source(&sample_table());
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([completion(&source)]),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert_eq!(report.result, RunResult::Passed);
    assert_eq!(report.generation_calls, 1);
    assert_eq!(report.executions, 1);
    assert_eq!(report.origin, Some(ArtifactOrigin::Generated));

    // the fenced completion is stored sanitized
    let stored = fx.store.load(&target("icici")).unwrap();
    assert_eq!(stored.text(), source);

    let handle = fx.registry.lookup(&target("icici")).unwrap();
    assert_eq!(handle.digest(), stored.digest());
    assert_eq!(report.digest, Some(stored.digest()));
}

#[tokio::test]
async fn unavailable_generation_falls_back_on_every_attempt() {
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::failing("no API key configured", 3),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::GenerationFailed(_)));
    assert_eq!(report.generation_calls, 3);
    assert_eq!(report.executions, 3);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.origin, Some(ArtifactOrigin::Fallback));
    assert_eq!(
        kinds(&report.result),
        vec![
            DiagnosticKind::Generation,
            DiagnosticKind::Stub,
            DiagnosticKind::Generation,
            DiagnosticKind::Stub,
            DiagnosticKind::Generation,
            DiagnosticKind::Stub,
        ]
    );
    assert!(report.result.diagnostics()[0]
        .message
        .contains("no API key configured"));

    // the stub is persisted so store and registry agree
    let stored = fx.store.load(&target("icici")).unwrap();
    assert!(is_stub(stored.text()));
    let handle = fx.registry.lookup(&target("icici")).unwrap();
    assert!(handle.is_fallback());
    assert_eq!(handle.digest(), stored.digest());

    // the stub's empty table is still surfaced
    let table = report.table.unwrap();
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.columns, sample_table().columns);
}

#[tokio::test]
async fn mismatches_are_fed_back_until_output_matches() {
    let wrong = parser_source(&wrong_table());
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([
            completion(&wrong),
            completion(&wrong),
            completion(&parser_source(&sample_table())),
        ]),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert_eq!(report.result, RunResult::Passed);
    assert_eq!(report.executions, 3);
    assert_eq!(report.generation_calls, 3);
    assert_eq!(report.attempts, 3);

    let requests = fx.generator.requests();
    assert_eq!(requests[0].prior_diagnostic, None);
    let hint = requests[1].prior_diagnostic.as_deref().unwrap();
    assert!(hint.contains("1 of 10 cells differ"), "{hint}");
    assert!(hint.contains("Balance"), "{hint}");
    assert!(requests[2].prior_diagnostic.is_some());
}

#[tokio::test]
async fn retries_are_bounded() {
    let wrong = parser_source(&wrong_table());
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new((0..10).map(|_| completion(&wrong))),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::FailedAfterRetries(_)));
    assert_eq!(report.executions, 3);
    assert_eq!(report.generation_calls, 3);
    assert_eq!(kinds(&report.result), vec![DiagnosticKind::Mismatch; 3]);
    assert_eq!(report.table, Some(wrong_table()));
}

#[tokio::test]
async fn single_attempt_configuration_never_retries() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::failing("quota exceeded", 5),
        ForgeConfig::default().with_max_attempts(1),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::GenerationFailed(_)));
    assert_eq!(report.generation_calls, 1);
    assert_eq!(report.executions, 1);
}

#[tokio::test]
async fn second_run_reuses_bound_artifact() {
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([completion(&parser_source(&sample_table()))]),
    );

    let first = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();
    let second = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(first.result.is_passed());
    assert!(second.result.is_passed());
    assert_eq!(second.generation_calls, 0);
    assert_eq!(second.origin, Some(ArtifactOrigin::Generated));
    assert_eq!(fx.generator.calls(), 1);
    // already bound with the same digest: no second load
    assert_eq!(fx.loader.loads(), 1);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn invalid_syntax_falls_back_then_corrects() {
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([
            GenerationResult::Source("```python\ndef parse(pdf_path:\n    return\n```".into()),
            completion(&parser_source(&sample_table())),
        ]),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert_eq!(report.result, RunResult::Passed);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.generation_calls, 2);
    assert_eq!(report.origin, Some(ArtifactOrigin::Generated));

    let hint = fx.generator.requests()[1].prior_diagnostic.clone().unwrap();
    assert!(hint.starts_with("syntax error"), "{hint}");
    assert!(!is_stub(fx.store.load(&target("icici")).unwrap().text()));
}

#[tokio::test]
async fn python2_completion_is_never_persisted() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([GenerationResult::Source(
            "def parse(pdf_path):\n    print \"parsing\", pdf_path\n    return None\n".into(),
        )]),
        ForgeConfig::default().with_max_attempts(1),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::GenerationFailed(_)));
    let diagnostics = report.result.diagnostics();
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Validation);
    assert!(diagnostics[0].message.contains("print statement"), "{}", diagnostics[0].message);
    assert_eq!(report.origin, Some(ArtifactOrigin::Fallback));
    assert!(is_stub(fx.store.load(&target("icici")).unwrap().text()));
}

#[tokio::test]
async fn contract_violation_is_rejected_before_persisting() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([GenerationResult::Source(
            "def parse(pdf_path, password):\n    return None\n".into(),
        )]),
        ForgeConfig::default().with_max_attempts(1),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    let diagnostics = report.result.diagnostics();
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Validation);
    assert!(diagnostics[0].message.contains("exactly one"));
    assert!(is_stub(fx.store.load(&target("icici")).unwrap().text()));
}

#[tokio::test]
async fn execution_failure_is_fed_back() {
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([
            completion(&failing_parser_source("IndexError: list index out of range")),
            completion(&parser_source(&sample_table())),
        ]),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(report.result.is_passed());
    assert_eq!(report.executions, 2);
    let hint = fx.generator.requests()[1].prior_diagnostic.clone().unwrap();
    assert!(hint.contains("IndexError"), "{hint}");
}

#[tokio::test]
async fn panicking_artifact_is_contained() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new()
            .with_artifact(target("icici"), &panicking_parser_source("segfault in pdf lib")),
        ScriptedGenerator::default(),
        ForgeConfig::default()
            .with_max_attempts(1)
            .with_retry_policy(RetryPolicy::ReuseArtifact),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    let diagnostics = report.result.diagnostics();
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Execution);
    assert!(diagnostics[0].message.contains("segfault in pdf lib"));
}

#[tokio::test]
async fn column_mismatch_fails_execution() {
    let mut renamed = sample_table();
    renamed.columns[0] = "Txn Date".into();
    let fx = Fixture::with_config(
        MemoryArtifactStore::new().with_artifact(target("icici"), &parser_source(&renamed)),
        ScriptedGenerator::default(),
        ForgeConfig::default().with_max_attempts(1),
    );

    let report = fx.orchestrator.run(RunRequest::new(target("icici"), INPUT)).await.unwrap();

    let diagnostics = report.result.diagnostics();
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Execution);
    assert!(diagnostics[0].message.contains("column mismatch"));
}

#[tokio::test]
async fn success_without_reference_passes() {
    let fx = Fixture::new(
        MemoryArtifactStore::new().with_artifact(target("sbi"), &parser_source(&wrong_table())),
        ScriptedGenerator::default(),
    );

    let report = fx.orchestrator.run(RunRequest::new(target("sbi"), INPUT)).await.unwrap();

    assert!(report.result.is_passed());
    assert_eq!(report.table, Some(wrong_table()));
}

#[tokio::test]
async fn reuse_policy_reexecutes_without_generating() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new().with_artifact(target("icici"), &parser_source(&wrong_table())),
        ScriptedGenerator::new([completion(&parser_source(&sample_table()))]),
        ForgeConfig::default().with_retry_policy(RetryPolicy::ReuseArtifact),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::FailedAfterRetries(_)));
    assert_eq!(report.executions, 3);
    assert_eq!(report.generation_calls, 0);
}

#[tokio::test]
async fn reuse_policy_still_replaces_a_stub() {
    let mut script = vec![GenerationResult::Failure("rate limited".into())];
    script.push(completion(&parser_source(&sample_table())));
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new(script),
        ForgeConfig::default().with_retry_policy(RetryPolicy::ReuseArtifact),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(report.result.is_passed());
    assert_eq!(report.generation_calls, 2);
    // a generation failure says nothing about code
    assert_eq!(fx.generator.requests()[1].prior_diagnostic, None);
}

#[tokio::test]
async fn forced_regeneration_replaces_stored_artifact() {
    let fx = Fixture::new(
        MemoryArtifactStore::new().with_artifact(target("icici"), &parser_source(&wrong_table())),
        ScriptedGenerator::new([completion(&parser_source(&sample_table()))]),
    );

    let report = fx
        .orchestrator
        .run(expecting_sample("icici").with_force_regenerate(true))
        .await
        .unwrap();

    assert!(report.result.is_passed());
    assert_eq!(report.generation_calls, 1);
    assert_eq!(report.executions, 1);
    assert_eq!(
        fx.store.load(&target("icici")).unwrap().text(),
        parser_source(&sample_table())
    );
}

#[tokio::test]
async fn stored_stub_is_regenerated() {
    let stub = StubArtifact::for_contract(&InterfaceContract::default());
    let fx = Fixture::new(
        MemoryArtifactStore::new().with_artifact(target("icici"), &stub.source(&target("icici"))),
        ScriptedGenerator::new([completion(&parser_source(&sample_table()))]),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(report.result.is_passed());
    assert_eq!(report.generation_calls, 1);
    assert_eq!(report.origin, Some(ArtifactOrigin::Generated));
}

#[tokio::test]
async fn persistence_failure_aborts_the_run() {
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(FakeLoader::new())));
    let orchestrator = Orchestrator::new(
        ForgeConfig::default(),
        Arc::new(FailingStore::new()),
        Arc::new(ScriptedGenerator::new([completion(&parser_source(&sample_table()))])),
        registry.clone(),
    )
    .unwrap();

    let err = orchestrator.run(expecting_sample("icici")).await.unwrap_err();

    assert!(matches!(err, ForgeError::Store(_)), "{err}");
    assert_eq!(err.category(), "persistence");
    // nothing was bound for an artifact that was never stored
    assert!(registry.lookup(&target("icici")).is_err());
}

#[tokio::test]
async fn unloadable_stored_artifact_aborts_the_run() {
    let fx = Fixture::new(
        MemoryArtifactStore::new().with_artifact(target("icici"), "def main():\n    pass\n"),
        ScriptedGenerator::default(),
    );

    let err = fx.orchestrator.run(expecting_sample("icici")).await.unwrap_err();

    assert!(matches!(err, ForgeError::Registration(_)), "{err}");
    assert_eq!(fx.generator.calls(), 0);
}

#[tokio::test]
async fn loader_rejection_leaves_store_and_registry_agreeing() {
    let old_source = failing_parser_source("layout changed");
    let store = MemoryArtifactStore::new().with_artifact(target("icici"), &old_source);
    let rejected = format!("{}# reject: sandbox refused\n", parser_source(&sample_table()));
    let fx = Fixture::new(
        store,
        ScriptedGenerator::new([GenerationResult::Source(rejected)]),
    );

    let err = fx.orchestrator.run(expecting_sample("icici")).await.unwrap_err();

    assert!(matches!(err, ForgeError::Registration(_)), "{err}");
    let stored = fx.store.load(&target("icici")).unwrap();
    assert_eq!(stored.text(), old_source);
    let bound = fx.registry.lookup(&target("icici")).unwrap();
    assert_eq!(bound.digest(), stored.digest());
    assert_eq!(bound.origin(), ArtifactOrigin::Stored);
}

#[tokio::test]
async fn rejected_first_artifact_is_never_persisted() {
    let rejected = format!("{}# reject: sandbox refused\n", parser_source(&sample_table()));
    let fx = Fixture::new(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([GenerationResult::Source(rejected)]),
    );

    let err = fx.orchestrator.run(expecting_sample("icici")).await.unwrap_err();

    assert_eq!(err.category(), "registration");
    assert!(!fx.store.exists(&target("icici")).unwrap());
    assert!(fx.registry.lookup(&target("icici")).is_err());
}

#[tokio::test]
async fn stale_binding_is_replaced_by_stored_artifact() {
    let stored = parser_source(&sample_table());
    let fx = Fixture::new(
        MemoryArtifactStore::new().with_artifact(target("icici"), &stored),
        ScriptedGenerator::default(),
    );
    let stale = ArtifactSource::new(parser_source(&wrong_table()));
    fx.registry
        .register(&target("icici"), &stale, ArtifactOrigin::Generated)
        .unwrap();

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert_eq!(report.result, RunResult::Passed);
    assert_eq!(report.origin, Some(ArtifactOrigin::Stored));
    assert_eq!(report.digest, Some(ArtifactSource::new(stored).digest()));
    assert_eq!(fx.loader.loads(), 2);
    assert_eq!(fx.generator.calls(), 0);
}

#[tokio::test]
async fn attempt_limit_above_the_bound_is_refused() {
    let err = Orchestrator::new(
        ForgeConfig::default().with_max_attempts(MAX_ATTEMPTS + 1),
        Arc::new(MemoryArtifactStore::new()),
        Arc::new(ScriptedGenerator::default()),
        Arc::new(ArtifactRegistry::new(Arc::new(FakeLoader::new()))),
    )
    .unwrap_err();

    assert!(matches!(err, ForgeError::Config(_)), "{err}");
}

#[tokio::test]
async fn slow_generation_times_out_into_fallback() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::new([completion(&parser_source(&sample_table()))])
            .with_delay(Duration::from_secs(5)),
        ForgeConfig::default()
            .with_max_attempts(1)
            .with_generation_timeout_secs(1),
    );

    let report = fx.orchestrator.run(expecting_sample("icici")).await.unwrap();

    assert!(matches!(report.result, RunResult::GenerationFailed(_)));
    assert!(report.result.diagnostics()[0].message.contains("timed out"));
}

#[tokio::test]
async fn run_deadline_is_enforced() {
    let fx = Fixture::with_config(
        MemoryArtifactStore::new(),
        ScriptedGenerator::default().with_delay(Duration::from_secs(5)),
        ForgeConfig::default().with_run_timeout_secs(1),
    );

    let err = fx
        .orchestrator
        .run_with_deadline(expecting_sample("icici"))
        .await
        .unwrap_err();

    assert!(matches!(err, ForgeError::Timeout { duration_secs: 1 }), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orchestrators_share_one_registry() {
    let store = Arc::new(MemoryArtifactStore::new());
    let registry = Arc::new(ArtifactRegistry::new(Arc::new(FakeLoader::new())));
    let names = ["hdfc", "icici", "sbi", "axis"];

    let runs = names.iter().map(|name| {
        let orchestrator = Orchestrator::new(
            ForgeConfig::default(),
            store.clone(),
            Arc::new(ScriptedGenerator::new([completion(&parser_source(&sample_table()))])),
            registry.clone(),
        )
        .unwrap();
        async move { orchestrator.run(expecting_sample(name)).await }
    });
    let reports = futures::future::join_all(runs).await;

    for report in reports {
        assert!(report.unwrap().result.is_passed());
    }
    assert_eq!(registry.len(), names.len());
    assert_eq!(store.len(), names.len());
}
