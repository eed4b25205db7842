//! Scripted in-memory `QueryService` used by every workflow test.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use bqjobs_bigquery::api::{
    ErrorProto, Job, JobReference, JobState, JobStatus, QueryResults, TableCell, TableFieldSchema,
    TableRow, TableSchema,
};
use bqjobs_bigquery::{ApiError, JobHandle, QueryService};

pub const JOB_ID: &str = "job_calendar_1";
pub const PROJECT: &str = "calendar-test";

/// One recorded call against the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Insert,
    GetJob,
    Results { start_index: u64, max_results: u32 },
    Cancel,
}

/// Service double: job states play back in order (the last one repeats),
/// results are served from an in-memory row list.
pub struct MockService {
    states: Mutex<VecDeque<JobState>>,
    job_error: Option<ErrorProto>,
    failing_status_call: Option<usize>,
    rows: Vec<TableRow>,
    reported_total: Option<u64>,
    total_after_probe: Option<u64>,
    failing_page: Option<u64>,
    ignore_max_results: bool,
    probe_complete: bool,
    insert_error: bool,
    cancel_error: bool,
    calls: Mutex<Vec<Call>>,
}

impl MockService {
    /// A job that is DONE on the first check and has `rows` result rows.
    pub fn new(rows: u64) -> Self {
        Self {
            states: Mutex::new(VecDeque::from([JobState::Done])),
            job_error: None,
            failing_status_call: None,
            rows: (0..rows).map(year_month_row).collect(),
            reported_total: None,
            total_after_probe: None,
            failing_page: None,
            ignore_max_results: false,
            probe_complete: true,
            insert_error: false,
            cancel_error: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_states(self, states: impl IntoIterator<Item = JobState>) -> Self {
        *self.states.lock().unwrap() = states.into_iter().collect();
        self
    }

    /// The final DONE status carries this error result.
    pub fn with_job_error(mut self, reason: &str, message: &str) -> Self {
        self.job_error = Some(ErrorProto {
            reason: reason.into(),
            message: message.into(),
            location: None,
        });
        self
    }

    /// The `n`-th (1-based) status check fails with HTTP 500.
    pub fn failing_status_call(mut self, n: usize) -> Self {
        self.failing_status_call = Some(n);
        self
    }

    pub fn with_raw_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.rows = rows
            .into_iter()
            .map(|cells| TableRow {
                f: cells.into_iter().map(|v| TableCell { v }).collect(),
            })
            .collect();
        self
    }

    /// Announce `total` rows regardless of how many are stored.
    pub fn reporting_total(mut self, total: u64) -> Self {
        self.reported_total = Some(total);
        self
    }

    /// Page responses (not the probe) report this total.
    pub fn total_changing_to(mut self, total: u64) -> Self {
        self.total_after_probe = Some(total);
        self
    }

    /// The page starting at `start_index` fails with HTTP 503.
    pub fn failing_page_at(mut self, start_index: u64) -> Self {
        self.failing_page = Some(start_index);
        self
    }

    /// Pages return every stored row from the start index on.
    pub fn ignoring_max_results(mut self) -> Self {
        self.ignore_max_results = true;
        self
    }

    /// The probe reports `jobComplete: false`.
    pub fn with_incomplete_probe(mut self) -> Self {
        self.probe_complete = false;
        self
    }

    pub fn failing_insert(mut self) -> Self {
        self.insert_error = true;
        self
    }

    pub fn failing_cancel(mut self) -> Self {
        self.cancel_error = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Start indices of page requests, excluding the zero-row probe.
    pub fn page_starts(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Results {
                    start_index,
                    max_results,
                } if max_results > 0 => Some(start_index),
                _ => None,
            })
            .collect()
    }

    pub fn probes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Results { max_results: 0, .. }))
            .count()
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call.clone());
        calls.iter().filter(|c| **c == call).count()
    }

    fn total(&self) -> u64 {
        self.reported_total.unwrap_or(self.rows.len() as u64)
    }

    fn reference(&self) -> JobReference {
        JobReference {
            project_id: PROJECT.into(),
            job_id: JOB_ID.into(),
            location: Some("US".into()),
        }
    }
}

pub fn handle() -> JobHandle {
    JobHandle::new(PROJECT, JOB_ID).with_location(Some("US".into()))
}

pub fn year_month_schema() -> TableSchema {
    TableSchema {
        fields: vec![
            TableFieldSchema {
                name: "Year".into(),
                field_type: "INTEGER".into(),
                mode: Some("NULLABLE".into()),
                fields: vec![],
            },
            TableFieldSchema {
                name: "Month".into(),
                field_type: "INTEGER".into(),
                mode: Some("NULLABLE".into()),
                fields: vec![],
            },
        ],
    }
}

/// Row `i` reads `Year:2017 Month:{i}`.
pub fn year_month_row(i: u64) -> TableRow {
    TableRow {
        f: vec![
            TableCell { v: json!("2017") },
            TableCell {
                v: json!(i.to_string()),
            },
        ],
    }
}

#[async_trait]
impl QueryService for MockService {
    async fn insert_job(&self, project_id: &str, request: &Job) -> Result<Job, ApiError> {
        self.record(Call::Insert);
        assert_eq!(project_id, PROJECT);
        assert!(request.configuration.is_some(), "insert carries a configuration");

        if self.insert_error {
            return Err(ApiError::Api {
                status: 400,
                message: "Invalid value for: query".into(),
            });
        }
        Ok(Job {
            job_reference: Some(self.reference()),
            status: Some(JobStatus {
                state: JobState::Pending,
                error_result: None,
                errors: vec![],
            }),
            ..Job::default()
        })
    }

    async fn get_job(&self, job: &JobHandle) -> Result<Job, ApiError> {
        let n = self.record(Call::GetJob);
        assert_eq!(job.job_id, JOB_ID);

        if self.failing_status_call == Some(n) {
            return Err(ApiError::Api {
                status: 500,
                message: "backendError".into(),
            });
        }

        let state = {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                states.front().cloned().unwrap_or(JobState::Done)
            }
        };
        let error_result = match state {
            JobState::Done => self.job_error.clone(),
            _ => None,
        };

        Ok(Job {
            job_reference: Some(self.reference()),
            status: Some(JobStatus {
                state,
                error_result,
                errors: vec![],
            }),
            ..Job::default()
        })
    }

    async fn get_query_results(
        &self,
        job: &JobHandle,
        start_index: u64,
        max_results: u32,
    ) -> Result<QueryResults, ApiError> {
        self.record(Call::Results {
            start_index,
            max_results,
        });
        assert_eq!(job.job_id, JOB_ID);
        assert_eq!(job.location.as_deref(), Some("US"), "location is echoed");

        if max_results == 0 {
            return Ok(QueryResults {
                schema: Some(year_month_schema()),
                total_rows: Some(self.total()),
                rows: vec![],
                job_complete: Some(self.probe_complete),
                errors: vec![],
            });
        }

        if self.failing_page == Some(start_index) {
            return Err(ApiError::Api {
                status: 503,
                message: "Service unavailable".into(),
            });
        }

        let start = (start_index as usize).min(self.rows.len());
        let end = if self.ignore_max_results {
            self.rows.len()
        } else {
            (start + max_results as usize).min(self.rows.len())
        };

        Ok(QueryResults {
            schema: Some(year_month_schema()),
            total_rows: Some(self.total_after_probe.unwrap_or_else(|| self.total())),
            rows: self.rows[start..end].to_vec(),
            job_complete: Some(true),
            errors: vec![],
        })
    }

    async fn cancel_job(&self, job: &JobHandle) -> Result<(), ApiError> {
        self.record(Call::Cancel);
        assert_eq!(job.job_id, JOB_ID);
        if self.cancel_error {
            return Err(ApiError::Api {
                status: 404,
                message: "Not found".into(),
            });
        }
        Ok(())
    }
}
