//! Error taxonomy for the submit → poll → paginate workflow.
//!
//! [`ApiError`] describes why a single remote call failed. [`BigQueryError`]
//! says which phase of the workflow it broke, so callers can tell a failed
//! submission from a failed page read without inspecting HTTP details.

/// Failure of one call against the remote query-execution API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but lacked a field the workflow depends on.
    #[error("Response missing field: {0}")]
    MissingField(&'static str),

    /// The access token could not be obtained or refreshed.
    #[error("Token refresh failed: {0}")]
    Auth(String),
}

/// Errors surfaced by the query workflow. Every variant is fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    /// Credential artifact missing, malformed or rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The job insert request failed; no job id is available.
    #[error("Job submission failed: {0}")]
    Submission(#[source] ApiError),

    /// A status check failed (distinct from "not yet done").
    #[error("Status check for job {job_id} failed: {source}")]
    StatusFetch {
        job_id: String,
        #[source]
        source: ApiError,
    },

    /// The job reached a terminal state carrying an error result.
    #[error("Job {job_id} failed: {reason}: {message}")]
    JobFailed {
        job_id: String,
        reason: String,
        message: String,
    },

    /// The poll budget ran out before the job reported DONE.
    #[error("Job {job_id} not done after {attempts} status checks")]
    PollExhausted { job_id: String, attempts: u32 },

    /// A result page could not be fetched; results are unavailable.
    #[error("Fetching results of job {job_id} at row {start_index} failed: {source}")]
    PageFetch {
        job_id: String,
        start_index: u64,
        #[source]
        source: ApiError,
    },

    /// The service stopped returning rows before the announced total.
    #[error("Incomplete results for job {job_id}: received {received} of {expected} rows")]
    IncompleteResults {
        job_id: String,
        received: u64,
        expected: u64,
    },

    /// Writing decoded rows to the output sink failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl From<bqjobs_core::CoreError> for BigQueryError {
    fn from(err: bqjobs_core::CoreError) -> Self {
        BigQueryError::Config(err.to_string())
    }
}
