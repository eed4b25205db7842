use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bqjobs_core::config::{
    active_profile, profiled_env_bool, profiled_env_f64, profiled_env_first, profiled_env_opt,
    profiled_env_or, profiled_env_u32, profiled_env_u64,
};
use bqjobs_core::CoreError;

use crate::error::BigQueryError;
use crate::poll::PollPolicy;

/// Public BigQuery REST endpoint (v2).
pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_POLL_MAX_INTERVAL_MS: u64 = 30_000;

// ── BigQueryConfig ───────────────────────────────────────────────

/// Configuration for a BigQuery query run.
///
/// Reads from environment variables with optional profile prefix.
/// When `BQJOBS_PROFILE=PROD`, checks `PROD_BIGQUERY_PROJECT_ID` before
/// `BIGQUERY_PROJECT_ID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project that owns (and is billed for) the query job.
    pub project_id: Option<String>,
    /// Path to a service-account JSON key.
    pub credentials_path: Option<PathBuf>,
    /// Job location (e.g. "EU"); required by the service for some regions.
    pub location: Option<String>,
    /// REST endpoint base, without trailing slash.
    pub api_base_url: String,
    /// Rows requested per result page.
    pub page_size: u32,
    /// Pause between status checks (initial value when backoff is enabled).
    pub poll_interval_ms: u64,
    /// Status checks allowed before giving up.
    pub poll_max_attempts: u32,
    /// Interval multiplier per check; 1.0 keeps the interval fixed.
    pub poll_backoff_factor: f64,
    /// Upper bound for the backed-off interval.
    pub poll_max_interval_ms: u64,
    /// Submit queries in legacy SQL (required for `bigquery.defineFunction` UDFs).
    pub use_legacy_sql: bool,
    /// Request cancellation of the job when polling gives up.
    pub cancel_on_exhaustion: bool,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            credentials_path: None,
            location: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            poll_backoff_factor: 1.0,
            poll_max_interval_ms: DEFAULT_POLL_MAX_INTERVAL_MS,
            use_legacy_sql: true,
            cancel_on_exhaustion: true,
        }
    }
}

impl BigQueryConfig {
    /// Build config from environment variables.
    ///
    /// Reads `BQJOBS_PROFILE` to determine profile prefix.
    /// `BIGQUERY_PROJECT_ID` falls back to `GOOGLE_PROJECT_ID`, and
    /// `BIGQUERY_CREDENTIALS` falls back to `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// Build config for a specific named profile.
    pub fn from_env_profiled(profile: &str) -> Self {
        let defaults = Self::default();

        Self {
            project_id: profiled_env_first(profile, &["BIGQUERY_PROJECT_ID", "GOOGLE_PROJECT_ID"]),
            credentials_path: profiled_env_first(
                profile,
                &["BIGQUERY_CREDENTIALS", "GOOGLE_APPLICATION_CREDENTIALS"],
            )
            .map(PathBuf::from),
            location: profiled_env_opt(profile, "BIGQUERY_LOCATION"),
            api_base_url: profiled_env_or(profile, "BIGQUERY_API_BASE_URL", DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            page_size: profiled_env_u32(profile, "BIGQUERY_PAGE_SIZE", defaults.page_size),
            poll_interval_ms: profiled_env_u64(
                profile,
                "BIGQUERY_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            ),
            poll_max_attempts: profiled_env_u32(
                profile,
                "BIGQUERY_POLL_MAX_ATTEMPTS",
                defaults.poll_max_attempts,
            ),
            poll_backoff_factor: profiled_env_f64(
                profile,
                "BIGQUERY_POLL_BACKOFF",
                defaults.poll_backoff_factor,
            ),
            poll_max_interval_ms: profiled_env_u64(
                profile,
                "BIGQUERY_POLL_MAX_INTERVAL_MS",
                defaults.poll_max_interval_ms,
            ),
            use_legacy_sql: profiled_env_bool(
                profile,
                "BIGQUERY_USE_LEGACY_SQL",
                defaults.use_legacy_sql,
            ),
            cancel_on_exhaustion: profiled_env_bool(
                profile,
                "BIGQUERY_CANCEL_ON_EXHAUSTION",
                defaults.cancel_on_exhaustion,
            ),
        }
    }

    /// Fail fast on settings the run cannot start without.
    ///
    /// The project id is not checked here: it may still come from the
    /// service-account key, see [`crate::auth::ServiceAccountKey`].
    pub fn validate(&self) -> Result<(), BigQueryError> {
        if self.credentials_path.is_none() {
            return Err(CoreError::MissingEnv(
                "BIGQUERY_CREDENTIALS (or GOOGLE_APPLICATION_CREDENTIALS)".into(),
            )
            .into());
        }
        if self.page_size == 0 {
            return Err(invalid("BIGQUERY_PAGE_SIZE", "must be at least 1"));
        }
        if self.poll_max_attempts == 0 {
            return Err(invalid("BIGQUERY_POLL_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.poll_backoff_factor < 1.0 {
            return Err(invalid("BIGQUERY_POLL_BACKOFF", "must be 1.0 or greater"));
        }
        Ok(())
    }

    /// Polling behaviour derived from this config.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts,
            backoff_factor: self.poll_backoff_factor,
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
            cancel_on_exhaustion: self.cancel_on_exhaustion,
        }
    }
}

fn invalid(key: &str, reason: &str) -> BigQueryError {
    CoreError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// ── Tests ────────────────────────────────────────────────────────
