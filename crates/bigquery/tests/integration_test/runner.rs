//! Full runs: submit, poll, page, decode and write.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use bqjobs_bigquery::api::JobState;
use bqjobs_bigquery::{BigQueryConfig, BigQueryError, OutputFormat, PollPolicy, QueryRunner, QuerySpec};

use crate::mock::{Call, MockService, JOB_ID, PROJECT};

fn runner(service: &MockService, page_size: u32) -> QueryRunner<'_> {
    QueryRunner::new(
        service,
        PROJECT,
        page_size,
        PollPolicy::fixed(Duration::from_secs(1), 100),
    )
}

fn output(buf: Vec<u8>) -> Vec<String> {
    String::from_utf8(buf)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

/// Log lines written by the `tracing` fmt layer during a test.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn calendar_run_prints_every_row() {
    let service = MockService::new(25).with_states([JobState::Pending, JobState::Running, JobState::Done]);
    let mut out = Vec::new();

    let summary = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(summary.job_id, JOB_ID);
    assert_eq!(summary.total_rows, 25);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.rows_written, 25);
    assert!(summary.is_clean());

    let lines = output(out);
    assert_eq!(lines.len(), 25);
    assert_eq!(lines[0], "Year:2017 Month:0");
    assert_eq!(lines[24], "Year:2017 Month:24");

    let calls = service.calls();
    assert_eq!(calls[0], Call::Insert);
    assert_eq!(service.count(&Call::Insert), 1);
    assert_eq!(service.count(&Call::GetJob), 3);
    assert_eq!(service.page_starts(), vec![0, 10, 20]);
}

#[tokio::test]
async fn json_output() {
    let service = MockService::new(2);
    let mut out = Vec::new();

    runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Json)
        .await
        .unwrap();

    let rows: Vec<serde_json::Value> = output(out)
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows, vec![json!({"Year": 2017, "Month": 0}), json!({"Year": 2017, "Month": 1})]);
}

#[tokio::test]
async fn empty_result_set_writes_nothing() {
    let service = MockService::new(0);
    let mut out = Vec::new();

    let summary = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(summary.total_rows, 0);
    assert_eq!(summary.pages, 0);
    assert!(out.is_empty());
}

#[tokio::test]
async fn decode_failures_are_counted_and_skipped() {
    let service = MockService::new(0).with_raw_rows(vec![
        vec![json!("2017"), json!("5")],
        vec![json!("2017"), json!("6"), json!("extra")],
        vec![json!("2017"), json!("7")],
    ]);
    let mut out = Vec::new();

    let summary = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.decode_failures, 1);
    assert!(!summary.is_clean());
    assert_eq!(output(out), vec!["Year:2017 Month:5", "Year:2017 Month:7"]);
}

#[tokio::test]
async fn skipped_rows_are_not_reported_as_complete() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let service = MockService::new(0).with_raw_rows(vec![
        vec![json!("2017"), json!("5")],
        vec![json!("2017")],
    ]);
    let mut out = Vec::new();
    let summary = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();
    assert_eq!(summary.decode_failures, 1);

    let text = logs.text();
    assert!(text.contains("WARN"));
    assert!(text.contains("Result set read with undecodable rows skipped"));
    assert!(!text.contains("Result set complete"));
}

#[tokio::test]
async fn clean_run_logs_completion() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let service = MockService::new(3);
    let mut out = Vec::new();
    runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();

    let text = logs.text();
    assert!(text.contains("Result set complete"));
    assert!(!text.contains("undecodable rows skipped"));
}

#[tokio::test]
async fn submission_failure_stops_before_polling() {
    let service = MockService::new(5).failing_insert();
    let mut out = Vec::new();

    let err = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap_err();

    assert!(matches!(err, BigQueryError::Submission(_)));
    assert_eq!(service.calls(), vec![Call::Insert]);
    assert!(out.is_empty());
}

#[tokio::test]
async fn failed_job_prints_nothing() {
    let service = MockService::new(5).with_job_error("invalidQuery", "Syntax error");
    let mut out = Vec::new();

    let err = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap_err();

    assert!(matches!(err, BigQueryError::JobFailed { .. }));
    assert!(service.page_starts().is_empty());
    assert_eq!(service.probes(), 0);
    assert!(out.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_poll_never_reads_results() {
    let service = MockService::new(5).with_states([JobState::Running]);
    let mut out = Vec::new();

    let err = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap_err();

    assert!(matches!(err, BigQueryError::PollExhausted { attempts: 100, .. }));
    assert_eq!(service.probes(), 0);
    assert_eq!(service.count(&Call::Cancel), 1);
}

#[tokio::test]
async fn page_failure_keeps_earlier_rows_but_fails_the_run() {
    let service = MockService::new(25).failing_page_at(10);
    let mut out = Vec::new();

    let err = runner(&service, 10)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap_err();

    assert!(matches!(err, BigQueryError::PageFetch { start_index: 10, .. }));
    assert_eq!(output(out).len(), 10);
}

#[tokio::test]
async fn runner_from_config_uses_page_size() {
    let service = MockService::new(12);
    let config = BigQueryConfig {
        page_size: 5,
        ..BigQueryConfig::default()
    };
    let mut out = Vec::new();

    let summary = QueryRunner::from_config(&service, PROJECT, &config)
        .run(&QuerySpec::calendar(), &mut out, OutputFormat::Text)
        .await
        .unwrap();

    assert_eq!(summary.pages, 3);
    assert_eq!(service.page_starts(), vec![0, 5, 10]);
}
