//! End-to-end run of one query: submit, wait, page through, print.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BigQueryConfig;
use crate::decode::{decode_page, DecodedRow};
use crate::error::BigQueryError;
use crate::paginate::Paginator;
use crate::poll::{JobPoller, PollPolicy};
use crate::query::QuerySpec;
use crate::service::QueryService;
use crate::submit::JobSubmitter;

/// How decoded rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `Year:2017 Month:5`, one row per line.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    fn write_row<W: Write>(self, out: &mut W, row: &DecodedRow) -> std::io::Result<()> {
        match self {
            OutputFormat::Text => writeln!(out, "{row}"),
            OutputFormat::Json => writeln!(out, "{}", row.to_json()),
        }
    }
}

/// Outcome of a run that read the whole result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub job_id: String,
    pub total_rows: u64,
    pub pages: u64,
    pub rows_written: u64,
    /// Rows skipped because they did not match the schema.
    pub decode_failures: u64,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.decode_failures == 0
    }
}

/// Runs queries against one project with fixed paging and polling settings.
pub struct QueryRunner<'a> {
    service: &'a dyn QueryService,
    project_id: &'a str,
    page_size: u32,
    policy: PollPolicy,
}

impl<'a> QueryRunner<'a> {
    pub fn new(
        service: &'a dyn QueryService,
        project_id: &'a str,
        page_size: u32,
        policy: PollPolicy,
    ) -> Self {
        Self {
            service,
            project_id,
            page_size,
            policy,
        }
    }

    pub fn from_config(
        service: &'a dyn QueryService,
        project_id: &'a str,
        config: &BigQueryConfig,
    ) -> Self {
        Self::new(service, project_id, config.page_size, config.poll_policy())
    }

    /// Submit `spec`, wait for completion, and write every decoded row to
    /// `out` in result order.
    ///
    /// Rows that fail to decode are logged, counted and skipped. Any other
    /// failure stops the run; rows already written stay written.
    pub async fn run<W: Write>(
        &self,
        spec: &QuerySpec,
        out: &mut W,
        format: OutputFormat,
    ) -> Result<RunSummary, BigQueryError> {
        let job = JobSubmitter::new(self.service, self.project_id)
            .submit(spec)
            .await?;

        JobPoller::new(self.service, self.policy.clone())
            .wait_until_done(&job)
            .await?;

        let mut stream = Paginator::new(self.service, self.page_size)
            .fetch_all(&job)
            .await?;

        let mut summary = RunSummary {
            job_id: job.job_id.clone(),
            total_rows: stream.total_rows(),
            pages: 0,
            rows_written: 0,
            decode_failures: 0,
        };

        while let Some(page) = stream.next_page().await {
            let page = page?;
            summary.pages += 1;

            for (offset, decoded) in decode_page(stream.schema(), &page).enumerate() {
                match decoded {
                    Ok(row) => {
                        format.write_row(out, &row)?;
                        summary.rows_written += 1;
                    }
                    Err(e) => {
                        warn!(
                            job_id = %job.job_id,
                            row_index = page.start_index + offset as u64,
                            error = %e,
                            "Skipping undecodable row"
                        );
                        summary.decode_failures += 1;
                    }
                }
            }
            out.flush()?;
        }

        if summary.is_clean() {
            info!(
                job_id = %summary.job_id,
                total_rows = summary.total_rows,
                pages = summary.pages,
                rows_written = summary.rows_written,
                "Result set complete"
            );
        } else {
            warn!(
                job_id = %summary.job_id,
                total_rows = summary.total_rows,
                pages = summary.pages,
                rows_written = summary.rows_written,
                decode_failures = summary.decode_failures,
                "Result set read with undecodable rows skipped"
            );
        }
        Ok(summary)
    }
}
