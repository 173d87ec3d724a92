//! Workflow orchestrator
//!
//! Drives a request through reconnaissance -> generation -> validation ->
//! optimization to a terminal state. After every stage the checkpoint and
//! the status move in one atomic commit, a metric row is appended, and a
//! progress event is published. Cancellation is cooperative: the flag is
//! checked between stages and before every retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use casegen_generate::{GenerateError, GenerationTarget, Generator};
use casegen_llm::CachedLlm;
use casegen_model::{
    ActionTaken, AgentName, AuditId, CaseType, CheckpointId, DetailMap, ErrorCode,
    GenerationMetric, LlmUsageMetric, MetricStatus, Request, RequestId, RequestStatus,
    SecurityAuditLog, TestCase, TestMetadata, TestType, ValidationStatus,
};
use casegen_optimize::{Optimizer, OptimizerConfig};
use casegen_recon::PageDriver;
use casegen_store::{RequestPatch, Store};
use casegen_validate::{
    CandidateTest, SandboxAnalyzer, Validator, ValidatorConfig,
};
use serde_json::json;

use crate::checkpoint::Checkpoint;
use crate::config::CasegenConfig;
use crate::error::PipelineError;
use crate::progress::{EventMetric, ProgressBus, ProgressEvent};

/// Fixed backoff between reconnaissance retries
const RECON_BACKOFF: Duration = Duration::from_secs(2);

/// Output of a successful stage execution
struct StageReport {
    agent_metrics: DetailMap,
    usage: Option<LlmUsageMetric>,
    /// Present only on the final stage; becomes the request result summary
    summary: Option<DetailMap>,
}

impl StageReport {
    fn new(agent_metrics: DetailMap) -> Self {
        Self {
            agent_metrics,
            usage: None,
            summary: None,
        }
    }
}

/// The stage state-machine driver
pub struct Orchestrator {
    store: Arc<dyn Store>,
    driver: Arc<dyn PageDriver>,
    llm: Arc<CachedLlm>,
    bus: Arc<ProgressBus>,
    generator: Generator,
    validator: Validator,
    optimizer: Optimizer,
    config: Arc<CasegenConfig>,
}

impl Orchestrator {
    /// Wire an orchestrator from its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        driver: Arc<dyn PageDriver>,
        llm: Arc<CachedLlm>,
        bus: Arc<ProgressBus>,
        config: Arc<CasegenConfig>,
    ) -> Self {
        let generator = Generator::new(Arc::clone(&llm), config.llm.model.clone());
        let validator = Validator::with_config(ValidatorConfig {
            fanout: config.validator_fanout,
            per_test_timeout: Duration::from_secs(config.stage_timeouts_s.validation_per_test_s),
        });
        let optimizer = Optimizer::with_config(OptimizerConfig {
            similarity_threshold: config.similarity_threshold,
            embedding_fanout: config.validator_fanout,
        });
        Self {
            store,
            driver,
            llm,
            bus,
            generator,
            validator,
            optimizer,
            config,
        }
    }

    /// Attach an external sandbox analyzer to the validator
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxAnalyzer>) -> Self {
        let validator = std::mem::replace(&mut self.validator, Validator::new());
        self.validator = validator.with_sandbox(sandbox);
        self
    }

    /// Progress bus handle
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Drive a request to a terminal state; idempotent
    ///
    /// Returns immediately when the request is already terminal. A request
    /// that ends in `failed` or `cancelled` still returns `Ok`; only
    /// infrastructure failures (store, corrupt checkpoint) error.
    pub async fn start(&self, request_id: RequestId) -> Result<(), PipelineError> {
        let request = self.fetch(request_id).await?;
        if request.status.is_terminal() {
            tracing::debug!(request = %request_id, status = %request.status, "start on terminal request is a no-op");
            return Ok(());
        }
        let checkpoint = self.load_checkpoint(&request).await?;
        self.drive(request, checkpoint).await
    }

    /// Reload the last checkpoint and continue from the stage after it
    ///
    /// # Errors
    /// [`PipelineError::CheckpointCorrupt`] when the blob cannot be decoded.
    pub async fn resume(&self, request_id: RequestId) -> Result<(), PipelineError> {
        let request = self.fetch(request_id).await?;
        if request.status.is_terminal() {
            return Ok(());
        }
        let checkpoint = self.load_checkpoint(&request).await?;
        tracing::info!(
            request = %request_id,
            stage_completed = ?checkpoint.stage_completed,
            "resuming from checkpoint"
        );
        self.drive(request, checkpoint).await
    }

    /// Request cooperative cancellation
    ///
    /// The in-flight external call finishes; the stage loop observes the
    /// flag at its next check and transitions the request to `cancelled`.
    pub async fn cancel(&self, request_id: RequestId) -> Result<(), PipelineError> {
        let request = self.fetch(request_id).await?;
        if request.status.is_terminal() {
            return Ok(());
        }
        tracing::info!(request = %request_id, "cancellation requested");
        self.bus.cancel(request_id);
        Ok(())
    }

    async fn fetch(&self, request_id: RequestId) -> Result<Request, PipelineError> {
        self.store.get_request(request_id).await.map_err(|err| match err {
            casegen_store::StoreError::RequestNotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Store(other),
        })
    }

    async fn load_checkpoint(&self, request: &Request) -> Result<Checkpoint, PipelineError> {
        match request.workflow_checkpoint_id {
            Some(id) => Checkpoint::decode(self.store.get_checkpoint(id).await?),
            None => Ok(Checkpoint::new()),
        }
    }

    async fn drive(
        &self,
        mut request: Request,
        mut checkpoint: Checkpoint,
    ) -> Result<(), PipelineError> {
        let id = request.id;

        if request.status == RequestStatus::Pending {
            if self.bus.is_cancelled(id) {
                return self.finish_cancelled(&request, &checkpoint).await;
            }
            request = self
                .store
                .commit_request(
                    id,
                    RequestPatch::new()
                        .status(RequestStatus::Reconnaissance)
                        .started_at(Utc::now()),
                )
                .await?;
            self.bus.publish(ProgressEvent::new(
                id,
                Some(AgentName::Reconnaissance),
                request.status,
            ));
        }

        while let Some(stage) = checkpoint.next_stage() {
            if self.bus.is_cancelled(id) {
                return self.finish_cancelled(&request, &checkpoint).await;
            }

            // resume path: surface the running stage before executing it
            if request.status != stage.running_status() {
                request = self
                    .store
                    .commit_request(id, RequestPatch::new().status(stage.running_status()))
                    .await?;
                self.bus
                    .publish(ProgressEvent::new(id, Some(stage), request.status));
            }

            let started = Utc::now();
            tracing::info!(request = %id, stage = %stage, "stage started");
            let result = match stage {
                AgentName::Reconnaissance => self.stage_recon(&request, &mut checkpoint).await,
                AgentName::Generator => self.stage_generate(&request, &mut checkpoint).await,
                AgentName::Validator => self.stage_validate(&request, &mut checkpoint).await,
                AgentName::Optimizer => self.stage_optimize(&request, &mut checkpoint).await,
            };
            let completed = Utc::now();

            match result {
                Ok(report) => {
                    checkpoint.stage_completed = Some(stage);
                    let next_status = checkpoint
                        .next_stage()
                        .map_or(RequestStatus::Completed, |s| s.running_status());

                    let mut metric =
                        GenerationMetric::new(id, stage, started, completed, MetricStatus::Success);
                    metric.agent_metrics = report.agent_metrics;
                    if let Some(usage) = report.usage {
                        metric = metric.with_usage(usage);
                    }
                    let duration_ms = metric.duration_ms;

                    let mut patch = RequestPatch::new()
                        .status(next_status)
                        .retry_count(checkpoint.retry_count)
                        .checkpoint(CheckpointId::new(), checkpoint.encode());
                    if next_status == RequestStatus::Completed {
                        let now = Utc::now();
                        patch = patch.completed_at(now);
                        if let Some(started_at) = request.started_at {
                            patch = patch.duration_seconds(
                                (now - started_at).num_milliseconds().max(0) as f64 / 1000.0,
                            );
                        }
                        if let Some(summary) = report.summary {
                            patch = patch.result_summary(summary);
                        }
                    }

                    request = self.store.commit_request(id, patch).await?;
                    self.store.insert_metric(metric).await?;
                    tracing::info!(request = %id, stage = %stage, status = %request.status, "stage completed");
                    self.bus.publish(
                        ProgressEvent::new(id, Some(stage), request.status).with_metric(
                            EventMetric {
                                agent_name: stage,
                                duration_ms,
                                status: MetricStatus::Success,
                            },
                        ),
                    );
                }
                Err(PipelineError::Cancelled) => {
                    return self.finish_cancelled(&request, &checkpoint).await;
                }
                Err(error) => {
                    let metric =
                        GenerationMetric::new(id, stage, started, completed, MetricStatus::Failed)
                            .with_error(error.to_string());
                    self.store.insert_metric(metric).await?;
                    return self.finish_failed(&request, &checkpoint, stage, error).await;
                }
            }
        }

        Ok(())
    }

    async fn finish_failed(
        &self,
        request: &Request,
        checkpoint: &Checkpoint,
        stage: AgentName,
        error: PipelineError,
    ) -> Result<(), PipelineError> {
        let code = terminal_code(stage, &error);
        let now = Utc::now();
        let mut patch = RequestPatch::new()
            .status(RequestStatus::Failed)
            .error(code, error.to_string())
            .completed_at(now)
            .retry_count(checkpoint.retry_count)
            .checkpoint(CheckpointId::new(), checkpoint.encode());
        if let Some(started_at) = request.started_at {
            patch = patch.duration_seconds((now - started_at).num_milliseconds().max(0) as f64 / 1000.0);
        }
        self.store.commit_request(request.id, patch).await?;
        tracing::warn!(request = %request.id, stage = %stage, %code, %error, "request failed");
        self.bus.publish(ProgressEvent::new(
            request.id,
            Some(stage),
            RequestStatus::Failed,
        ));
        Ok(())
    }

    async fn finish_cancelled(
        &self,
        request: &Request,
        checkpoint: &Checkpoint,
    ) -> Result<(), PipelineError> {
        let now = Utc::now();
        let mut patch = RequestPatch::new()
            .status(RequestStatus::Cancelled)
            .completed_at(now)
            .retry_count(checkpoint.retry_count)
            .checkpoint(CheckpointId::new(), checkpoint.encode());
        if let Some(started_at) = request.started_at {
            patch = patch.duration_seconds((now - started_at).num_milliseconds().max(0) as f64 / 1000.0);
        }
        self.store.commit_request(request.id, patch).await?;
        tracing::info!(request = %request.id, "request cancelled, partial checkpoint preserved");
        self.bus.publish(ProgressEvent::new(
            request.id,
            checkpoint.stage_completed,
            RequestStatus::Cancelled,
        ));
        Ok(())
    }

    async fn stage_recon(
        &self,
        request: &Request,
        checkpoint: &mut Checkpoint,
    ) -> Result<StageReport, PipelineError> {
        if checkpoint.endpoints.is_some() {
            // API requests carry their endpoint list from ingest
            let mut metrics = DetailMap::new();
            metrics.insert("source".into(), json!("openapi"));
            return Ok(StageReport::new(metrics));
        }

        let deadline = Duration::from_secs(self.config.stage_timeouts_s.recon_s);
        let mut attempt: u32 = 0;
        loop {
            if self.bus.is_cancelled(request.id) {
                return Err(PipelineError::Cancelled);
            }
            let attempt_started = Utc::now();
            let outcome =
                tokio::time::timeout(deadline, self.driver.extract(&request.url, deadline)).await;

            let error: PipelineError = match outcome {
                Ok(Ok(page)) => {
                    let mut metrics = DetailMap::new();
                    metrics.insert("elements".into(), json!(page.element_count()));
                    metrics.insert("attempts".into(), json!(attempt + 1));
                    checkpoint.page = Some(page);
                    return Ok(StageReport::new(metrics));
                }
                Ok(Err(err)) => err.into(),
                Err(_) => PipelineError::StageTimeout(deadline),
            };

            if error.is_transient() && attempt < self.config.max_retries.recon {
                attempt += 1;
                checkpoint.retry_count += 1;
                tracing::warn!(request = %request.id, attempt, %error, "reconnaissance retry");
                self.store
                    .insert_metric(
                        GenerationMetric::new(
                            request.id,
                            AgentName::Reconnaissance,
                            attempt_started,
                            Utc::now(),
                            MetricStatus::Retry,
                        )
                        .with_error(error.to_string()),
                    )
                    .await?;
                tokio::time::sleep(RECON_BACKOFF).await;
                continue;
            }
            return Err(error);
        }
    }

    async fn stage_generate(
        &self,
        request: &Request,
        checkpoint: &mut Checkpoint,
    ) -> Result<StageReport, PipelineError> {
        let target = match &checkpoint.endpoints {
            Some(endpoints) => GenerationTarget::Endpoints(endpoints.clone()),
            None => GenerationTarget::Page(checkpoint.page.clone().ok_or_else(|| {
                PipelineError::CheckpointCorrupt(
                    "no page structure recorded before generation".into(),
                )
            })?),
        };

        let deadline = Duration::from_secs(self.config.stage_timeouts_s.generation_s);
        let mut regenerated = false;
        let mut timeout_attempt: u32 = 0;
        let mut backoff = Duration::from_secs(1);

        loop {
            if self.bus.is_cancelled(request.id) {
                return Err(PipelineError::Cancelled);
            }
            let attempt_started = Utc::now();
            let outcome = tokio::time::timeout(
                deadline,
                self.generator.generate(
                    &target,
                    &request.requirements,
                    request.test_type,
                    regenerated,
                ),
            )
            .await;

            match outcome {
                Ok(Ok(result)) => {
                    // surface the wrapper's transient retries as metric rows
                    for retry in 0..result.retries {
                        self.store
                            .insert_metric(
                                GenerationMetric::new(
                                    request.id,
                                    AgentName::Generator,
                                    attempt_started,
                                    Utc::now(),
                                    MetricStatus::Retry,
                                )
                                .with_error(format!("transient llm failure (attempt {})", retry + 1)),
                            )
                            .await?;
                    }
                    checkpoint.retry_count += result.retries;

                    let mut metrics = DetailMap::new();
                    metrics.insert("tests_generated".into(), json!(result.tests.len()));
                    metrics.insert("cache_hit".into(), json!(result.cache_hit));
                    metrics.insert("regenerated".into(), json!(regenerated));
                    let usage = LlmUsageMetric {
                        model: result.model,
                        tokens_input: result.usage.input_tokens,
                        tokens_output: result.usage.output_tokens,
                        tokens_total: result.usage.total_tokens,
                        cost_usd: result.usage.cost_usd,
                    };
                    checkpoint.raw_tests = Some(result.tests);

                    return Ok(StageReport {
                        agent_metrics: metrics,
                        usage: Some(usage),
                        summary: None,
                    });
                }
                Ok(Err(GenerateError::EmptyOutput)) if !regenerated => {
                    // parse failure gets exactly one regeneration attempt
                    regenerated = true;
                    checkpoint.retry_count += 1;
                    tracing::warn!(request = %request.id, "empty generator output, regenerating once");
                    self.store
                        .insert_metric(
                            GenerationMetric::new(
                                request.id,
                                AgentName::Generator,
                                attempt_started,
                                Utc::now(),
                                MetricStatus::Retry,
                            )
                            .with_error("empty output, regenerating"),
                        )
                        .await?;
                    continue;
                }
                Ok(Err(error)) => return Err(error.into()),
                Err(_) if timeout_attempt < self.config.max_retries.generation => {
                    timeout_attempt += 1;
                    checkpoint.retry_count += 1;
                    tracing::warn!(request = %request.id, timeout_attempt, "generation deadline expired, retrying");
                    self.store
                        .insert_metric(
                            GenerationMetric::new(
                                request.id,
                                AgentName::Generator,
                                attempt_started,
                                Utc::now(),
                                MetricStatus::Retry,
                            )
                            .with_error(format!("stage deadline expired after {deadline:?}")),
                        )
                        .await?;
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    continue;
                }
                Err(_) => return Err(PipelineError::StageTimeout(deadline)),
            }
        }
    }

    async fn stage_validate(
        &self,
        request: &Request,
        checkpoint: &mut Checkpoint,
    ) -> Result<StageReport, PipelineError> {
        let raw_tests = checkpoint.raw_tests.clone().ok_or_else(|| {
            PipelineError::CheckpointCorrupt("no generated tests recorded before validation".into())
        })?;

        let candidates: Vec<CandidateTest> = raw_tests
            .iter()
            .map(|t| CandidateTest::new(&t.name, &t.code))
            .collect();
        let per_test = self.config.stage_timeouts_s.validation_per_test_s;
        let cap = self.config.stage_timeouts_s.validation_cap_s;
        let deadline =
            Duration::from_secs((per_test.saturating_mul(candidates.len() as u64)).min(cap).max(per_test));

        let results = tokio::time::timeout(deadline, self.validator.validate_batch(candidates))
            .await
            .map_err(|_| PipelineError::StageTimeout(deadline))??;

        let case_type = match request.test_type {
            TestType::Manual => CaseType::Manual,
            _ => CaseType::Automated,
        };

        let mut passed = 0usize;
        let mut warnings = 0usize;
        let mut blocked = 0usize;
        let mut tests = Vec::with_capacity(raw_tests.len());

        for (raw, validation) in raw_tests.into_iter().zip(results) {
            let mut test = TestCase::new(request.id, raw.name, raw.code, case_type);
            test.metadata = validation.metadata;
            test.covered_requirements = raw
                .declared_coverage
                .into_iter()
                .filter(|&index| index < request.requirements.len())
                .collect();
            test.validation_status = validation.status;
            test.validation_issues = validation.issues;
            test.safety_risk_level = validation.risk;
            test.ast_hash = validation.ast_hash;
            test.priority = priority_from(&test.metadata);

            match validation.status {
                ValidationStatus::Passed => passed += 1,
                ValidationStatus::Warning => warnings += 1,
                ValidationStatus::Failed => blocked += 1,
            }

            for finding in validation.safety_findings {
                let action = if finding.risk.is_blocking() {
                    ActionTaken::Blocked
                } else {
                    ActionTaken::Warning
                };
                self.store
                    .insert_audit(SecurityAuditLog {
                        id: AuditId::new(),
                        request_id: request.id,
                        test_id: Some(test.id),
                        security_layer: finding.layer,
                        risk_level: finding.risk,
                        issues: finding.issues,
                        blocked_patterns: finding.blocked_patterns,
                        action_taken: action,
                        details: DetailMap::new(),
                        created_at: Utc::now(),
                    })
                    .await?;
            }

            tests.push(test);
        }

        self.store.insert_tests(tests).await?;
        // rows are the source of truth from here on; slim the checkpoint
        checkpoint.raw_tests = None;

        let mut metrics = DetailMap::new();
        metrics.insert("validated".into(), json!(passed + warnings + blocked));
        metrics.insert("passed".into(), json!(passed));
        metrics.insert("warnings".into(), json!(warnings));
        metrics.insert("blocked".into(), json!(blocked));
        Ok(StageReport::new(metrics))
    }

    async fn stage_optimize(
        &self,
        request: &Request,
        _checkpoint: &mut Checkpoint,
    ) -> Result<StageReport, PipelineError> {
        let all_tests = self.store.tests_for_request(request.id).await?;
        let generated = all_tests.len();
        let blocked = all_tests
            .iter()
            .filter(|t| t.validation_status == ValidationStatus::Failed)
            .count();
        let surviving: Vec<TestCase> = all_tests
            .into_iter()
            .filter(|t| t.validation_status != ValidationStatus::Failed)
            .collect();

        let deadline = Duration::from_secs(self.config.stage_timeouts_s.optimization_s);
        let outcome = tokio::time::timeout(
            deadline,
            self.optimizer
                .optimize(request.id, &request.requirements, surviving, &*self.llm),
        )
        .await
        .map_err(|_| PipelineError::StageTimeout(deadline))??;

        if outcome.unique.is_empty() {
            return Err(PipelineError::NoTests);
        }

        self.store.update_tests(outcome.tests.clone()).await?;
        self.store
            .replace_coverage(request.id, outcome.coverage.clone())
            .await?;

        let mut metrics = DetailMap::new();
        metrics.insert("unique".into(), json!(outcome.unique.len()));
        metrics.insert("duplicates".into(), json!(outcome.duplicates.len()));
        metrics.insert("coverage_score".into(), json!(outcome.coverage_score));
        metrics.insert("gaps".into(), json!(outcome.gaps.len()));

        let mut summary = DetailMap::new();
        summary.insert("tests_generated".into(), json!(generated));
        summary.insert("tests_blocked".into(), json!(blocked));
        summary.insert("tests_unique".into(), json!(outcome.unique.len()));
        summary.insert("tests_duplicate".into(), json!(outcome.duplicates.len()));
        summary.insert("coverage_score".into(), json!(outcome.coverage_score));
        summary.insert("coverage_gaps".into(), json!(outcome.gaps));

        Ok(StageReport {
            agent_metrics: metrics,
            usage: None,
            summary: Some(summary),
        })
    }
}

/// Stable error code for a terminal failure in `stage`
fn terminal_code(stage: AgentName, error: &PipelineError) -> ErrorCode {
    match (stage, error) {
        (_, PipelineError::NoTests) => ErrorCode::NoTests,
        (
            AgentName::Reconnaissance,
            PipelineError::Recon(_) | PipelineError::StageTimeout(_),
        ) => ErrorCode::ReconTimeout,
        (AgentName::Generator, PipelineError::Generate(GenerateError::EmptyOutput)) => {
            ErrorCode::EmptyOutput
        }
        (
            AgentName::Generator,
            PipelineError::Generate(GenerateError::Llm(_))
            | PipelineError::Llm(_)
            | PipelineError::StageTimeout(_),
        ) => ErrorCode::LlmUnavailable,
        _ => ErrorCode::Internal,
    }
}

/// Priority 1..=10 derived from the severity tag
fn priority_from(metadata: &TestMetadata) -> u8 {
    let severity = metadata
        .severity
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    if severity.contains("blocker") {
        10
    } else if severity.contains("critical") {
        8
    } else if severity.contains("minor") {
        3
    } else if severity.contains("trivial") {
        2
    } else {
        5
    }
}
