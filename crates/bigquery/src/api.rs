//! Wire types for the BigQuery REST API (v2), limited to the job and
//! query-results resources this crate talks to.
//!
//! BigQuery encodes 64-bit counters (`totalRows`, byte counts, timestamps in
//! millis) as JSON strings; [`de_opt_u64`] accepts either form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Jobs ─────────────────────────────────────────────────────────

/// A job resource, used both as the insert request body and as the
/// response of `jobs.insert` / `jobs.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<JobConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JobStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    #[serde(default)]
    pub project_id: String,
    /// Empty on insert requests: the service assigns the id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<JobConfigurationQuery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_defined_function_resources: Vec<UserDefinedFunctionResource>,
}

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedFunctionResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,
}

/// Job state as reported by the service.
///
/// Unknown strings are preserved rather than rejected so that new service
/// states do not break polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Unknown(String),
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "DONE" => JobState::Done,
            _ => JobState::Unknown(s),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Done => write!(f, "DONE"),
            JobState::Unknown(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: JobState,
    /// Set when the job finished unsuccessfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorProto>,
    /// All errors encountered during execution; may be non-empty on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    /// DONE together with an error result.
    pub fn failure(&self) -> Option<&ErrorProto> {
        if self.is_done() {
            self.error_result.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    #[serde(default, deserialize_with = "de_opt_u64", skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64", skip_serializing_if = "Option::is_none")]
    pub total_bytes_processed: Option<u64>,
}

impl JobStatistics {
    /// Wall-clock run time, when both start and end are known.
    pub fn elapsed_ms(&self) -> Option<u64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.checked_sub(start),
            _ => None,
        }
    }
}

// ── Query results ────────────────────────────────────────────────

/// Response of `jobs.getQueryResults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(default, deserialize_with = "de_opt_u64", skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<TableRow>,
    /// Absent on older responses; treated as complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Sub-fields of a RECORD column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

/// One row: positional cells under `f`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

/// One cell. `v` is a string, null, an array of `{v}` (REPEATED) or a
/// nested `{f: [...]}` (RECORD).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────

/// Deserialize an optional u64 sent either as a JSON number or a string.
fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Num(u64),
        Str(String),
    }

    match Option::<StrOrNum>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StrOrNum::Num(n)) => Ok(Some(n)),
        Some(StrOrNum::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
