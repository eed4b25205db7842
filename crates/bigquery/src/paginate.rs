//! Paged reads of a completed job's results.
//!
//! A zero-row probe (`maxResults=0`) reads the authoritative total and the
//! schema without consuming a row. Pages are then requested in increasing
//! start-index order until the total is reached. The first failure ends the
//! stream, so an incomplete read can never look like a complete one.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::api::TableRow;
use crate::error::{ApiError, BigQueryError};
use crate::result::{ResultPage, ResultSchema};
use crate::service::{JobHandle, QueryService};

/// Schema, total and a lazy stream of pages for one read of a job's results.
pub struct PageStream<'a> {
    schema: ResultSchema,
    total_rows: u64,
    pages: BoxStream<'a, Result<ResultPage, BigQueryError>>,
}

impl<'a> PageStream<'a> {
    pub fn schema(&self) -> &ResultSchema {
        &self.schema
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Next page, or `None` once all rows were read or after the first error.
    pub async fn next_page(&mut self) -> Option<Result<ResultPage, BigQueryError>> {
        self.pages.next().await
    }

    pub fn into_parts(self) -> (ResultSchema, BoxStream<'a, Result<ResultPage, BigQueryError>>) {
        (self.schema, self.pages)
    }
}

/// Drives bounded-size page fetches for completed jobs.
pub struct Paginator<'a> {
    service: &'a dyn QueryService,
    page_size: u32,
}

impl<'a> Paginator<'a> {
    /// `page_size` is clamped to at least 1.
    pub fn new(service: &'a dyn QueryService, page_size: u32) -> Self {
        Self {
            service,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Probe the job's results and return a stream over all its pages.
    ///
    /// Every call starts over from row 0, so reading a completed job twice
    /// yields the same rows.
    pub async fn fetch_all(&self, job: &JobHandle) -> Result<PageStream<'a>, BigQueryError> {
        let probe = self
            .service
            .get_query_results(job, 0, 0)
            .await
            .map_err(|source| page_error(job, 0, source))?;

        if probe.job_complete == Some(false) {
            return Err(BigQueryError::JobFailed {
                job_id: job.job_id.clone(),
                reason: "jobIncomplete".into(),
                message: "results requested before the job completed".into(),
            });
        }

        let total_rows = probe
            .total_rows
            .ok_or_else(|| page_error(job, 0, ApiError::MissingField("totalRows")))?;

        let schema = match probe.schema.as_ref() {
            Some(schema) => ResultSchema::from(schema),
            None if total_rows == 0 => ResultSchema::default(),
            None => return Err(page_error(job, 0, ApiError::MissingField("schema"))),
        };

        let page_size = self.page_size;
        info!(
            job_id = %job.job_id,
            total_rows,
            columns = schema.len(),
            page_size,
            pages = total_rows.div_ceil(page_size as u64),
            "Result set probed"
        );

        let service = self.service;
        let job = job.clone();
        let pages = stream::try_unfold(0u64, move |start_index| {
            let job = job.clone();
            async move {
                if start_index >= total_rows {
                    return Ok(None);
                }
                let page = fetch_page(service, &job, start_index, page_size, total_rows).await?;
                let next_index = page.end_index();
                Ok::<_, BigQueryError>(Some((page, next_index)))
            }
        })
        .boxed();

        Ok(PageStream {
            schema,
            total_rows,
            pages,
        })
    }

    /// Read every row of the job into memory, in order.
    pub async fn read_all(
        &self,
        job: &JobHandle,
    ) -> Result<(ResultSchema, Vec<TableRow>), BigQueryError> {
        let (schema, pages) = self.fetch_all(job).await?.into_parts();
        let pages: Vec<ResultPage> = pages.try_collect().await?;
        let rows = pages.into_iter().flat_map(|p| p.rows).collect();
        Ok((schema, rows))
    }
}

async fn fetch_page(
    service: &dyn QueryService,
    job: &JobHandle,
    start_index: u64,
    page_size: u32,
    total_rows: u64,
) -> Result<ResultPage, BigQueryError> {
    let results = service
        .get_query_results(job, start_index, page_size)
        .await
        .map_err(|source| page_error(job, start_index, source))?;

    if let Some(reported) = results.total_rows.filter(|t| *t != total_rows) {
        warn!(
            job_id = %job.job_id,
            expected = total_rows,
            reported,
            "Total row count changed between pages"
        );
        return Err(BigQueryError::IncompleteResults {
            job_id: job.job_id.clone(),
            received: start_index,
            expected: total_rows,
        });
    }

    let mut rows = results.rows;
    if rows.is_empty() {
        warn!(job_id = %job.job_id, start_index, "Empty page before end of results");
        return Err(BigQueryError::IncompleteResults {
            job_id: job.job_id.clone(),
            received: start_index,
            expected: total_rows,
        });
    }
    let remaining = (total_rows - start_index) as usize;
    if rows.len() > remaining {
        rows.truncate(remaining);
    }

    debug!(
        job_id = %job.job_id,
        start_index,
        rows = rows.len(),
        "Fetched result page"
    );

    Ok(ResultPage {
        start_index,
        page_size,
        total_rows,
        rows,
    })
}

fn page_error(job: &JobHandle, start_index: u64, source: ApiError) -> BigQueryError {
    BigQueryError::PageFetch {
        job_id: job.job_id.clone(),
        start_index,
        source,
    }
}
