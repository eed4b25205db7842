//! BigQuery REST client.
//!
//! Provides [`BigQueryClient`], the production [`QueryService`]: it talks to
//! the BigQuery v2 jobs API over HTTPS with a service-account bearer token
//! and maps non-success responses to [`ApiError::Api`] using the Google
//! error envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::api::{ErrorEnvelope, Job, JobReference, QueryResults};
use crate::auth::{ServiceAccountKey, TokenProvider};
use crate::config::BigQueryConfig;
use crate::error::{ApiError, BigQueryError};
use crate::service::{JobHandle, QueryService};

/// Per-request timeout. Status polls are short calls, so this only bounds a
/// stuck connection, never job runtime.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Authenticated client for the BigQuery jobs API.
pub struct BigQueryClient {
    http: reqwest::Client,
    tokens: TokenProvider,
    base_url: String,
    project_id: String,
    location: Option<String>,
}

impl BigQueryClient {
    /// Build a client from configuration.
    ///
    /// Loads the service-account key named by `credentials_path`. When the
    /// config has no (or an empty) project id, the key's own `project_id` is
    /// used; with neither, this is a [`BigQueryError::Config`] error.
    pub fn connect(config: &BigQueryConfig) -> Result<Self, BigQueryError> {
        config.validate()?;

        let path = config
            .credentials_path
            .as_deref()
            .ok_or_else(|| BigQueryError::Config("no credentials path".into()))?;
        let key = ServiceAccountKey::from_file(path)?;

        let project_id = config
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| key.project_id.clone().filter(|p| !p.is_empty()));
        let project_id = match project_id {
            Some(p) => p,
            None => {
                return Err(BigQueryError::Config(
                    "no project id: set BIGQUERY_PROJECT_ID or use a key with project_id".into(),
                ))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BigQueryError::Config(format!("HTTP client: {e}")))?;

        info!(
            project_id = %project_id,
            client_email = %key.client_email,
            base_url = %config.api_base_url,
            "BigQueryClient initialised"
        );

        Ok(Self::new(
            http.clone(),
            TokenProvider::new(http, key),
            &config.api_base_url,
            project_id,
            config.location.clone(),
        ))
    }

    pub fn new(
        http: reqwest::Client,
        tokens: TokenProvider,
        base_url: &str,
        project_id: String,
        location: Option<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            location,
        }
    }

    /// Project that jobs are submitted to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Run the token exchange now, so rejected credentials surface as
    /// [`BigQueryError::Auth`] before any job is submitted.
    pub async fn authenticate(&self) -> Result<(), BigQueryError> {
        self.tokens
            .access_token()
            .await
            .map(|_| ())
            .map_err(|e| BigQueryError::Auth(e.to_string()))
    }

    fn jobs_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}/jobs", self.base_url, project_id)
    }

    fn job_url(&self, job: &JobHandle) -> String {
        format!("{}/{}", self.jobs_url(&job.project_id), job.job_id)
    }

    fn query_results_url(&self, job: &JobHandle) -> String {
        format!("{}/projects/{}/queries/{}", self.base_url, job.project_id, job.job_id)
    }

    /// Attach the bearer token, send, and decode a success body as `T`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let body = check_status(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Insert request with the configured location filled in.
    fn with_location(&self, project_id: &str, request: &Job) -> Job {
        let mut request = request.clone();
        if let Some(location) = &self.location {
            let reference = request.job_reference.get_or_insert_with(|| JobReference {
                project_id: project_id.to_string(),
                ..JobReference::default()
            });
            if reference.location.is_none() {
                reference.location = Some(location.clone());
            }
        }
        request
    }
}

#[async_trait]
impl QueryService for BigQueryClient {
    async fn insert_job(&self, project_id: &str, request: &Job) -> Result<Job, ApiError> {
        let body = self.with_location(project_id, request);
        debug!(project_id = %project_id, "jobs.insert");
        self.send(self.http.post(self.jobs_url(project_id)).json(&body))
            .await
    }

    async fn get_job(&self, job: &JobHandle) -> Result<Job, ApiError> {
        debug!(job_id = %job.job_id, "jobs.get");
        self.send(self.http.get(self.job_url(job)).query(&location_param(job)))
            .await
    }

    async fn get_query_results(
        &self,
        job: &JobHandle,
        start_index: u64,
        max_results: u32,
    ) -> Result<QueryResults, ApiError> {
        debug!(job_id = %job.job_id, start_index, max_results, "jobs.getQueryResults");
        let request = self
            .http
            .get(self.query_results_url(job))
            .query(&[
                ("startIndex", start_index.to_string()),
                ("maxResults", max_results.to_string()),
            ])
            .query(&location_param(job));
        self.send(request).await
    }

    async fn cancel_job(&self, job: &JobHandle) -> Result<(), ApiError> {
        info!(job_id = %job.job_id, "Cancelling job");
        let url = format!("{}/cancel", self.job_url(job));
        let _: serde_json::Value = self
            .send(self.http.post(url).query(&location_param(job)))
            .await?;
        Ok(())
    }
}

fn location_param(job: &JobHandle) -> Vec<(&'static str, String)> {
    job.location
        .iter()
        .map(|l| ("location", l.clone()))
        .collect()
}

/// Body text of a success response, or an [`ApiError::Api`] carrying the
/// service's error message.
async fn check_status(response: Response) -> Result<String, ApiError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let message = error_message(&body);
    warn!(status, message = %message, "BigQuery API error");
    Err(ApiError::Api { status, message })
}

/// Message of a Google error envelope, or the raw body when it is not one.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{} ({status})", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
