//! End-to-end pipeline scenarios
//!
//! Drives the orchestrator over the in-memory store with scripted LLM and
//! driver fixtures, covering the full recon -> generate -> validate ->
//! optimize path including retries, safety blocking, cancellation, and
//! resume.

use std::sync::Arc;

use async_trait::async_trait;
use casegen_llm::{CachedLlm, ChatRequest, ChatResponse, LlmError, LlmProvider};
use casegen_model::{
    ActionTaken, AgentName, MetricStatus, Request, RequestId, RequestStatus, SecurityLayer,
    TestType, ValidationStatus,
};
use casegen_pipeline::{
    CasegenConfig, Checkpoint, Orchestrator, PipelineError, ProgressBus,
};
use casegen_recon::PageDriver;
use casegen_store::{MemoryStore, RequestPatch, Store};
use casegen_testkit::{
    login_page, FixtureDriver, ScriptedProvider, DUPLICATE_COMPLETION, LOGIN_COMPLETION,
    UNSAFE_COMPLETION,
};
use pretty_assertions::assert_eq;

const URL: &str = "https://example.com/login";

struct Harness {
    store: Arc<dyn Store>,
    bus: Arc<ProgressBus>,
    orchestrator: Orchestrator,
}

fn harness_with_driver(provider: Arc<dyn LlmProvider>, driver: Arc<dyn PageDriver>) -> Harness {
    let config = Arc::new(CasegenConfig::default());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let llm = Arc::new(CachedLlm::new(provider));
    let bus = Arc::new(ProgressBus::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        driver,
        llm,
        Arc::clone(&bus),
        config,
    );
    Harness {
        store,
        bus,
        orchestrator,
    }
}

fn harness(provider: Arc<dyn LlmProvider>) -> Harness {
    harness_with_driver(provider, Arc::new(FixtureDriver::new(login_page(URL))))
}

async fn submit(harness: &Harness, requirements: Vec<String>) -> RequestId {
    let request = Request::new(URL, requirements, TestType::Ui);
    let id = request.id;
    harness.store.insert_request(request).await.unwrap();
    id
}

#[tokio::test]
async fn login_requirement_is_fully_covered() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let id = submit(&h, vec!["login works".to_string()]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(request.started_at.unwrap() <= request.completed_at.unwrap());

    let tests = h.store.tests_for_request(id).await.unwrap();
    assert_eq!(tests.len(), 2);
    assert!(tests
        .iter()
        .all(|t| t.validation_status == ValidationStatus::Passed));
    assert!(tests.iter().all(|t| !t.is_duplicate));

    let coverage = h.store.coverage_for_request(id).await.unwrap();
    assert_eq!(coverage.len(), 1);
    let row = &coverage[0];
    assert!(row.is_covered);
    assert_eq!(row.coverage_count, 2);
    assert_eq!(row.coverage_score, 1.0);
    assert!(!row.has_gap);
    assert!(row
        .covering_tests
        .iter()
        .all(|covering| tests.iter().any(|t| t.id == *covering)));

    assert_eq!(
        request.result_summary.get("coverage_score").unwrap(),
        &serde_json::json!(1.0)
    );
}

#[tokio::test]
async fn exact_duplicate_is_folded_onto_the_first_test() {
    let h = harness(Arc::new(ScriptedProvider::always(DUPLICATE_COMPLETION)));
    let id = submit(&h, vec![]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);

    let tests = h.store.tests_for_request(id).await.unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0].code_hash, tests[1].code_hash);

    assert!(!tests[0].is_duplicate);
    assert!(tests[1].is_duplicate);
    assert_eq!(tests[1].duplicate_of, Some(tests[0].id));
    assert_eq!(tests[1].similarity_score, Some(1.0));
}

#[tokio::test]
async fn eval_test_is_blocked_and_audited() {
    let h = harness(Arc::new(ScriptedProvider::always(UNSAFE_COMPLETION)));
    let id = submit(&h, vec!["login works".to_string()]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);

    let tests = h.store.tests_for_request(id).await.unwrap();
    let blocked: Vec<_> = tests
        .iter()
        .filter(|t| t.validation_status == ValidationStatus::Failed)
        .collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].name, "test_login_eval");
    assert!(blocked[0].safety_risk_level.is_blocking());
    // blocked tests never enter the optimizer
    assert!(blocked[0].semantic_embedding.is_none());
    assert!(!blocked[0].is_exportable());

    let audit = h.store.audit_for_request(id).await.unwrap();
    let static_rows: Vec<_> = audit
        .iter()
        .filter(|a| a.security_layer == SecurityLayer::Static)
        .collect();
    assert!(!static_rows.is_empty());
    assert_eq!(static_rows[0].action_taken, ActionTaken::Blocked);
    assert!(static_rows[0]
        .blocked_patterns
        .contains(&"eval(".to_string()));
    assert_eq!(static_rows[0].test_id, Some(blocked[0].id));

    // the clean test still completes the pipeline
    let coverage = h.store.coverage_for_request(id).await.unwrap();
    assert!(coverage[0]
        .covering_tests
        .iter()
        .all(|covering| *covering != blocked[0].id));
}

#[tokio::test(start_paused = true)]
async fn transient_llm_failures_retry_then_succeed() {
    let provider = Arc::new(ScriptedProvider::flaky(3, LOGIN_COMPLETION));
    let h = harness(provider.clone());
    let id = submit(&h, vec!["login works".to_string()]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(request.retry_count >= 3);
    assert_eq!(provider.call_count(), 4);

    let metrics = h.store.metrics_for_request(id).await.unwrap();
    let generator_rows: Vec<_> = metrics
        .iter()
        .filter(|m| m.agent_name == AgentName::Generator)
        .collect();
    let retries = generator_rows
        .iter()
        .filter(|m| m.status == MetricStatus::Retry)
        .count();
    let successes = generator_rows
        .iter()
        .filter(|m| m.status == MetricStatus::Success)
        .count();
    assert!(retries >= 1);
    assert_eq!(successes, 1);
}

#[tokio::test(start_paused = true)]
async fn recon_timeouts_exhaust_retries_and_fail() {
    let driver = Arc::new(FixtureDriver::flaky(login_page(URL), 99));
    let h = harness_with_driver(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)), driver.clone());
    let id = submit(&h, vec![]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Failed);
    assert_eq!(request.error_code.unwrap().as_str(), "recon_timeout");
    assert!(request.error_message.is_some());
    // 1 attempt + 2 retries
    assert_eq!(driver.call_count(), 3);

    let metrics = h.store.metrics_for_request(id).await.unwrap();
    let recon_retries = metrics
        .iter()
        .filter(|m| {
            m.agent_name == AgentName::Reconnaissance && m.status == MetricStatus::Retry
        })
        .count();
    assert_eq!(recon_retries, 2);
}

/// Provider that flips the cancellation flag while the generation call is
/// in flight, mimicking a client cancel between stages.
struct CancelDuringChat {
    inner: ScriptedProvider,
    target: parking_lot::Mutex<Option<(Arc<ProgressBus>, RequestId)>>,
}

#[async_trait]
impl LlmProvider for CancelDuringChat {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self.inner.chat(request).await;
        if let Some((bus, id)) = self.target.lock().as_ref() {
            bus.cancel(*id);
        }
        response
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::NotConfigured("embeddings"))
    }
}

#[tokio::test]
async fn cancel_after_generation_preserves_the_checkpoint() {
    let provider = Arc::new(CancelDuringChat {
        inner: ScriptedProvider::always(LOGIN_COMPLETION),
        target: parking_lot::Mutex::new(None),
    });
    let h = harness(provider.clone());
    let id = submit(&h, vec!["login works".to_string()]).await;
    *provider.target.lock() = Some((Arc::clone(&h.bus), id));

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Cancelled);

    // generated tests survive in the checkpoint
    let checkpoint = Checkpoint::decode(
        h.store
            .get_checkpoint(request.workflow_checkpoint_id.unwrap())
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(checkpoint.stage_completed, Some(AgentName::Generator));
    assert_eq!(checkpoint.raw_tests.unwrap().len(), 2);

    // validation never ran: no rows, no coverage
    assert!(h.store.tests_for_request(id).await.unwrap().is_empty());
    assert!(h.store.coverage_for_request(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn resume_after_recon_matches_uninterrupted_run() {
    // uninterrupted reference run
    let full = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let full_id = submit(&full, vec!["login works".to_string()]).await;
    full.orchestrator.start(full_id).await.unwrap();
    let full_tests = full.store.tests_for_request(full_id).await.unwrap();
    let full_coverage = full.store.coverage_for_request(full_id).await.unwrap();

    // crashed-after-recon run: craft the post-recon state, then resume
    let resumed = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let resumed_id = submit(&resumed, vec!["login works".to_string()]).await;

    let mut checkpoint = Checkpoint::new();
    checkpoint.stage_completed = Some(AgentName::Reconnaissance);
    checkpoint.page = Some(login_page(URL));
    resumed
        .store
        .commit_request(
            resumed_id,
            RequestPatch::new()
                .status(RequestStatus::Reconnaissance)
                .started_at(chrono::Utc::now()),
        )
        .await
        .unwrap();
    resumed
        .store
        .commit_request(
            resumed_id,
            RequestPatch::new()
                .status(RequestStatus::Generation)
                .checkpoint(casegen_model::CheckpointId::new(), checkpoint.encode()),
        )
        .await
        .unwrap();

    resumed.orchestrator.resume(resumed_id).await.unwrap();

    let request = resumed.store.get_request(resumed_id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);

    // same terminal artifacts, ignoring ids and timestamps
    let resumed_tests = resumed.store.tests_for_request(resumed_id).await.unwrap();
    assert_eq!(full_tests.len(), resumed_tests.len());
    for (a, b) in full_tests.iter().zip(resumed_tests.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.code, b.code);
        assert_eq!(a.code_hash, b.code_hash);
        assert_eq!(a.validation_status, b.validation_status);
        assert_eq!(a.is_duplicate, b.is_duplicate);
    }
    let resumed_coverage = resumed.store.coverage_for_request(resumed_id).await.unwrap();
    assert_eq!(full_coverage.len(), resumed_coverage.len());
    for (a, b) in full_coverage.iter().zip(resumed_coverage.iter()) {
        assert_eq!(a.coverage_count, b.coverage_count);
        assert_eq!(a.is_covered, b.is_covered);
    }
}

#[tokio::test]
async fn progress_events_arrive_in_state_machine_order() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let id = submit(&h, vec![]).await;
    let (_, mut rx) = h.bus.subscribe(id);

    h.orchestrator.start(id).await.unwrap();

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        statuses.push(event.status);
    }
    assert_eq!(
        statuses,
        vec![
            RequestStatus::Reconnaissance,
            RequestStatus::Generation,
            RequestStatus::Validation,
            RequestStatus::Optimization,
            RequestStatus::Completed,
        ]
    );

    // a late subscriber sees the terminal status immediately
    let (current, _) = h.bus.subscribe(id);
    assert_eq!(current.unwrap().status, RequestStatus::Completed);
}

#[tokio::test]
async fn empty_requirements_still_complete() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let id = submit(&h, vec![]).await;

    h.orchestrator.start(id).await.unwrap();

    let request = h.store.get_request(id).await.unwrap();
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(h.store.coverage_for_request(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let id = submit(&h, vec![]).await;

    h.orchestrator.start(id).await.unwrap();
    let first_tests = h.store.tests_for_request(id).await.unwrap();

    // a second start on the terminal request is a no-op
    h.orchestrator.start(id).await.unwrap();
    let second_tests = h.store.tests_for_request(id).await.unwrap();
    assert_eq!(first_tests.len(), second_tests.len());
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let missing = RequestId::new();
    assert!(matches!(
        h.orchestrator.start(missing).await,
        Err(PipelineError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        h.orchestrator.cancel(missing).await,
        Err(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn corrupt_checkpoint_fails_resume() {
    let h = harness(Arc::new(ScriptedProvider::always(LOGIN_COMPLETION)));
    let id = submit(&h, vec![]).await;

    h.store
        .commit_request(
            id,
            RequestPatch::new().checkpoint(
                casegen_model::CheckpointId::new(),
                serde_json::json!({ "version": 999 }),
            ),
        )
        .await
        .unwrap();

    assert!(matches!(
        h.orchestrator.resume(id).await,
        Err(PipelineError::CheckpointCorrupt(_))
    ));
}
