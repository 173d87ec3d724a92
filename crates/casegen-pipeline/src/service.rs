//! Service facade
//!
//! Typed operations mirroring the HTTP surface; the router itself is an
//! external collaborator that calls into this type. Ingest creates the
//! request row and enqueues the job; reads go straight to the store.

use std::sync::Arc;

use casegen_llm::{CacheOptions, CachedLlm, LlmProvider, RetryPolicy};
use casegen_model::{
    CaseType, CheckpointId, GenerationMetric, Request, RequestId, RequestStatus, TestCase,
    TestType,
};
use casegen_optimize::{OptimizeOutcome, Optimizer, OptimizerConfig};
use casegen_recon::{ApiEndpoint, PageDriver};
use casegen_store::{Page, RequestPatch, Store, TestQuery};
use casegen_validate::{CandidateTest, TestValidation, ValidationLevel, Validator};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::checkpoint::Checkpoint;
use crate::config::CasegenConfig;
use crate::error::PipelineError;
use crate::export::{self, ExportBundle, ExportFormat};
use crate::orchestrator::Orchestrator;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::worker::{JobQueue, WorkerPool};

/// Ingest payload for web test generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Target page URL
    pub url: String,
    /// Ordered natural-language requirements
    pub requirements: Vec<String>,
    /// Requested test kind
    pub test_type: TestType,
    /// Owning principal
    pub owner: Option<String>,
    /// Override of the retry budget
    pub max_retries: Option<u32>,
}

/// Ingest payload for API test generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitApiRequest {
    /// OpenAPI document URL (recorded on the request row)
    pub openapi_url: String,
    /// Parsed endpoint list
    pub endpoints: Vec<ApiEndpoint>,
    /// Ordered natural-language requirements
    pub requirements: Vec<String>,
    /// Owning principal
    pub owner: Option<String>,
}

/// 202-style ingest acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAccepted {
    /// Created request id
    pub request_id: RequestId,
    /// Task handle (same id; kept for wire compatibility)
    pub task_id: RequestId,
    /// Status at acceptance
    pub status: RequestStatus,
    /// Relative path of the progress stream
    pub stream_path: String,
}

/// Poll response for one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    /// Current request row
    pub request: Request,
    /// Metric rows ordered by start time
    pub metrics: Vec<GenerationMetric>,
    /// Test rows, when requested
    pub tests: Option<Vec<TestCase>>,
}

/// The assembled service
pub struct CasegenService {
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    queue: JobQueue,
    bus: Arc<ProgressBus>,
    validator: Validator,
    llm: Arc<CachedLlm>,
    config: Arc<CasegenConfig>,
}

impl CasegenService {
    /// Wire the service and spawn its worker pool
    #[must_use]
    pub fn start(
        config: CasegenConfig,
        store: Arc<dyn Store>,
        driver: Arc<dyn PageDriver>,
        provider: Arc<dyn LlmProvider>,
    ) -> (Arc<Self>, WorkerPool) {
        let config = Arc::new(config);
        let llm = Arc::new(CachedLlm::with_options(
            provider,
            CacheOptions {
                capacity: 10_000,
                ttl: std::time::Duration::from_secs(config.cache_ttl_s),
                embedding_dim: config.embedding_dim,
                retry: RetryPolicy::default(),
            },
        ));
        let bus = Arc::new(ProgressBus::new());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            driver,
            Arc::clone(&llm),
            Arc::clone(&bus),
            Arc::clone(&config),
        ));
        let (queue, rx) = JobQueue::new();
        let workers = WorkerPool::spawn(config.workers, Arc::clone(&orchestrator), rx);

        let service = Arc::new(Self {
            store,
            orchestrator,
            queue,
            bus,
            validator: Validator::new(),
            llm,
            config,
        });
        (service, workers)
    }

    /// Orchestrator handle (tests drive stages directly through it)
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Store handle
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Accept a web generation request
    ///
    /// # Errors
    /// [`PipelineError::InvalidInput`] on an empty URL / blank requirement.
    pub async fn submit(&self, payload: SubmitRequest) -> Result<SubmitAccepted, PipelineError> {
        validate_url(&payload.url)?;
        validate_requirements(&payload.requirements)?;

        let mut request = Request::new(payload.url, payload.requirements, payload.test_type);
        if let Some(owner) = payload.owner {
            request = request.with_owner(owner);
        }
        if let Some(max_retries) = payload.max_retries {
            request = request.with_max_retries(max_retries);
        }
        let id = request.id;
        self.store.insert_request(request).await?;
        self.bus
            .publish(ProgressEvent::new(id, None, RequestStatus::Pending));
        self.queue.enqueue(id);
        tracing::info!(request = %id, "request accepted");

        Ok(SubmitAccepted {
            request_id: id,
            task_id: id,
            status: RequestStatus::Pending,
            stream_path: format!("/tasks/{id}/stream"),
        })
    }

    /// Accept an API generation request with a pre-parsed endpoint list
    pub async fn submit_api_tests(
        &self,
        payload: SubmitApiRequest,
    ) -> Result<SubmitAccepted, PipelineError> {
        validate_url(&payload.openapi_url)?;
        validate_requirements(&payload.requirements)?;
        if payload.endpoints.is_empty() {
            return Err(PipelineError::InvalidInput(
                "endpoint list must not be empty".into(),
            ));
        }

        let mut request = Request::new(payload.openapi_url, payload.requirements, TestType::Api);
        if let Some(owner) = payload.owner {
            request = request.with_owner(owner);
        }
        let id = request.id;
        self.store.insert_request(request).await?;

        // the endpoint list rides in the initial checkpoint
        let mut checkpoint = Checkpoint::new();
        checkpoint.endpoints = Some(payload.endpoints);
        self.store
            .commit_request(
                id,
                RequestPatch::new().checkpoint(CheckpointId::new(), checkpoint.encode()),
            )
            .await?;

        self.bus
            .publish(ProgressEvent::new(id, None, RequestStatus::Pending));
        self.queue.enqueue(id);
        tracing::info!(request = %id, "api request accepted");

        Ok(SubmitAccepted {
            request_id: id,
            task_id: id,
            status: RequestStatus::Pending,
            stream_path: format!("/tasks/{id}/stream"),
        })
    }

    /// Current status, metrics, and optionally the test list
    pub async fn task_status(
        &self,
        request_id: RequestId,
        include_tests: bool,
    ) -> Result<TaskStatus, PipelineError> {
        let request = self.get_request(request_id).await?;
        let metrics = self.store.metrics_for_request(request_id).await?;
        let tests = if include_tests {
            Some(self.store.tests_for_request(request_id).await?)
        } else {
            None
        };
        Ok(TaskStatus {
            request,
            metrics,
            tests,
        })
    }

    /// Subscribe to a request's progress stream
    ///
    /// Returns the current status (for late joiners) plus the live stream.
    pub async fn subscribe(
        &self,
        request_id: RequestId,
    ) -> Result<(Option<ProgressEvent>, broadcast::Receiver<ProgressEvent>), PipelineError> {
        let _ = self.get_request(request_id).await?;
        Ok(self.bus.subscribe(request_id))
    }

    /// Resume a request from its last checkpoint
    ///
    /// The checkpoint is decoded eagerly so a corrupt blob fails the call
    /// instead of the worker; the actual work is enqueued.
    pub async fn resume(&self, request_id: RequestId) -> Result<(), PipelineError> {
        let request = self.get_request(request_id).await?;
        if let Some(checkpoint_id) = request.workflow_checkpoint_id {
            Checkpoint::decode(self.store.get_checkpoint(checkpoint_id).await?)?;
        }
        self.queue.enqueue(request_id);
        Ok(())
    }

    /// Request cooperative cancellation
    pub async fn cancel(&self, request_id: RequestId) -> Result<(), PipelineError> {
        self.orchestrator.cancel(request_id).await
    }

    /// Standalone validation of submitted test code
    ///
    /// The code is split at test-function boundaries; a blob with no
    /// recognizable boundary is validated as a single unit.
    pub async fn validate_tests(
        &self,
        test_code: &str,
        level: ValidationLevel,
    ) -> Result<Vec<TestValidation>, PipelineError> {
        let split = casegen_generate::split_tests(test_code);
        let candidates: Vec<CandidateTest> = if split.is_empty() {
            vec![CandidateTest::new("test", test_code)]
        } else {
            split
                .into_iter()
                .map(|t| CandidateTest::new(t.name, t.code))
                .collect()
        };

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            results.push(self.validator.validate_one(candidate, level).await?);
        }
        Ok(results)
    }

    /// Standalone optimization of submitted test sources
    pub async fn optimize_tests(
        &self,
        sources: Vec<String>,
        requirements: Vec<String>,
    ) -> Result<OptimizeOutcome, PipelineError> {
        let scratch_request = RequestId::new();
        let tests: Vec<TestCase> = sources
            .into_iter()
            .enumerate()
            .map(|(index, code)| {
                TestCase::new(
                    scratch_request,
                    format!("test_{index}"),
                    code,
                    CaseType::Automated,
                )
            })
            .collect();

        let optimizer = Optimizer::with_config(OptimizerConfig {
            similarity_threshold: self.config.similarity_threshold,
            embedding_fanout: self.config.validator_fanout,
        });
        Ok(optimizer
            .optimize(scratch_request, &requirements, tests, &*self.llm)
            .await?)
    }

    /// Paged search over test rows
    pub async fn query_tests(&self, query: TestQuery) -> Result<Page<TestCase>, PipelineError> {
        Ok(self.store.query_tests(query).await?)
    }

    /// Export a request's surviving corpus
    pub async fn export(
        &self,
        request_id: RequestId,
        format: ExportFormat,
    ) -> Result<ExportBundle, PipelineError> {
        let _ = self.get_request(request_id).await?;
        export::build(&self.store, request_id, format).await
    }

    async fn get_request(&self, request_id: RequestId) -> Result<Request, PipelineError> {
        self.store
            .get_request(request_id)
            .await
            .map_err(|err| match err {
                casegen_store::StoreError::RequestNotFound(id) => PipelineError::NotFound(id),
                other => PipelineError::Store(other),
            })
    }
}

fn validate_url(url: &str) -> Result<(), PipelineError> {
    if url.trim().is_empty() {
        return Err(PipelineError::InvalidInput("url must not be empty".into()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(PipelineError::InvalidInput(format!(
            "url must be http(s): {url}"
        )));
    }
    Ok(())
}

fn validate_requirements(requirements: &[String]) -> Result<(), PipelineError> {
    if requirements.iter().any(|r| r.trim().is_empty()) {
        return Err(PipelineError::InvalidInput(
            "requirements must not contain blank entries".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn requirement_validation() {
        assert!(validate_requirements(&[]).is_ok());
        assert!(validate_requirements(&["login works".to_string()]).is_ok());
        assert!(validate_requirements(&["ok".to_string(), "  ".to_string()]).is_err());
    }
}
