//! The remote query-execution boundary.
//!
//! The workflow components ([`crate::submit`], [`crate::poll`],
//! [`crate::paginate`]) only depend on this trait. The production
//! implementation is [`crate::client::BigQueryClient`]; tests inject
//! in-memory services.

use crate::api::{Job, QueryResults};
use crate::error::ApiError;

/// Identifies a submitted job. Created once by the submitter and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub project_id: String,
    /// Location the service assigned to the job, echoed on later calls.
    pub location: Option<String>,
}

impl JobHandle {
    pub fn new(project_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            project_id: project_id.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }
}

/// Abstraction over the BigQuery jobs API.
///
/// Implementations must be safe to reuse sequentially; the workflow never
/// issues two calls at once.
#[async_trait::async_trait]
pub trait QueryService: Send + Sync {
    /// `jobs.insert`: create a job from `request` in `project_id`.
    async fn insert_job(&self, project_id: &str, request: &Job) -> Result<Job, ApiError>;

    /// `jobs.get`: fetch a fresh snapshot of the job, including its status.
    async fn get_job(&self, job: &JobHandle) -> Result<Job, ApiError>;

    /// `jobs.getQueryResults`: read up to `max_results` rows from `start_index`.
    ///
    /// `max_results = 0` returns only metadata (schema, total row count).
    async fn get_query_results(
        &self,
        job: &JobHandle,
        start_index: u64,
        max_results: u32,
    ) -> Result<QueryResults, ApiError>;

    /// `jobs.cancel`: request cancellation. The job may still finish.
    async fn cancel_job(&self, job: &JobHandle) -> Result<(), ApiError>;
}
