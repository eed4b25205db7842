use tracing::{error, info};

use crate::error::{ApiError, BigQueryError};
use crate::query::QuerySpec;
use crate::service::{JobHandle, QueryService};

/// Creates query jobs. One insert per call, never retried.
pub struct JobSubmitter<'a> {
    service: &'a dyn QueryService,
    project_id: &'a str,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(service: &'a dyn QueryService, project_id: &'a str) -> Self {
        Self {
            service,
            project_id,
        }
    }

    /// Submit `spec` as a new query job and return its handle.
    ///
    /// Any transport or service error is returned as
    /// [`BigQueryError::Submission`]. A job the service rejects outright
    /// (DONE with an error result in the insert response) is returned as
    /// [`BigQueryError::JobFailed`].
    pub async fn submit(&self, spec: &QuerySpec) -> Result<JobHandle, BigQueryError> {
        info!(
            project_id = %self.project_id,
            udfs = spec.udfs().len(),
            legacy_sql = spec.use_legacy_sql(),
            "Submitting query job"
        );

        let request = spec.to_job_request();
        let job = self
            .service
            .insert_job(self.project_id, &request)
            .await
            .map_err(|e| {
                error!(error = %e, "Job insert failed");
                BigQueryError::Submission(e)
            })?;

        let reference = job
            .job_reference
            .filter(|r| !r.job_id.is_empty())
            .ok_or(BigQueryError::Submission(ApiError::MissingField(
                "jobReference.jobId",
            )))?;

        if let Some(failure) = job.status.as_ref().and_then(|s| s.failure()) {
            error!(job_id = %reference.job_id, reason = %failure.reason, "Job rejected on insert");
            return Err(BigQueryError::JobFailed {
                job_id: reference.job_id,
                reason: failure.reason.clone(),
                message: failure.message.clone(),
            });
        }

        let project_id = if reference.project_id.is_empty() {
            self.project_id.to_string()
        } else {
            reference.project_id
        };

        let handle =
            JobHandle::new(project_id, reference.job_id).with_location(reference.location);
        info!(
            job_id = %handle.job_id,
            location = handle.location.as_deref().unwrap_or("-"),
            "Query job submitted"
        );
        Ok(handle)
    }
}
