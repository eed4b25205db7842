//! bqjobs: run a BigQuery query job and print every result row.
//!
//! Without `--query`/`--query-file`, runs the built-in calendar expansion
//! query with its inline UDF. Rows go to stdout, logs to stderr.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{error, info};

use bqjobs_bigquery::{BigQueryClient, BigQueryConfig, OutputFormat, QueryRunner, QuerySpec, UdfResource};
use bqjobs_core::config::{active_profile, load_dotenv};

// ── CLI ─────────────────────────────────────────────────────────────

/// Submit a query job, wait for it, and page through its results.
#[derive(Parser, Debug)]
#[command(name = "bqjobs", version, about)]
struct Cli {
    /// Config profile; `PROD` reads `PROD_BIGQUERY_*` before `BIGQUERY_*`.
    #[arg(long, env = "BQJOBS_PROFILE")]
    profile: Option<String>,

    /// Project that runs the job.
    #[arg(long)]
    project: Option<String>,

    /// Service-account JSON key file.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Query text.
    #[arg(long, conflicts_with = "query_file")]
    query: Option<String>,

    /// File holding the query text.
    #[arg(long)]
    query_file: Option<PathBuf>,

    /// JavaScript UDF source file, sent inline (repeatable).
    #[arg(long = "udf-file")]
    udf_files: Vec<PathBuf>,

    /// Cloud Storage URI of a UDF source file (repeatable).
    #[arg(long = "udf-uri")]
    udf_uris: Vec<String>,

    /// Submit as standard SQL instead of legacy SQL.
    #[arg(long)]
    standard_sql: bool,

    /// Rows per result page.
    #[arg(long)]
    page_size: Option<u32>,

    /// Row output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Cli {
    fn apply_overrides(&self, config: &mut BigQueryConfig) {
        if let Some(project) = &self.project {
            config.project_id = Some(project.clone());
        }
        if let Some(path) = &self.credentials {
            config.credentials_path = Some(path.clone());
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
        if self.standard_sql {
            config.use_legacy_sql = false;
        }
    }

    fn query_spec(&self, use_legacy_sql: bool) -> anyhow::Result<QuerySpec> {
        let query = match (&self.query, &self.query_file) {
            (Some(q), _) => q.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading query file {}", path.display()))?,
            (None, None) => {
                if !self.udf_files.is_empty() || !self.udf_uris.is_empty() {
                    bail!("--udf-file/--udf-uri need --query or --query-file");
                }
                return Ok(QuerySpec::calendar());
            }
        };

        let mut udfs = Vec::with_capacity(self.udf_files.len() + self.udf_uris.len());
        for path in &self.udf_files {
            let code = std::fs::read_to_string(path)
                .with_context(|| format!("reading UDF file {}", path.display()))?;
            udfs.push(UdfResource::Inline(code));
        }
        udfs.extend(self.udf_uris.iter().cloned().map(UdfResource::Uri));

        Ok(QuerySpec::new(query, udfs, use_legacy_sql))
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let profile = cli
        .profile
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(active_profile);
    let mut config = BigQueryConfig::from_env_profiled(&profile);
    cli.apply_overrides(&mut config);

    let spec = cli.query_spec(config.use_legacy_sql)?;
    let client = BigQueryClient::connect(&config).context("connecting to BigQuery")?;
    client.authenticate().await.context("authenticating")?;

    info!(profile = %profile, project_id = %client.project_id(), "bqjobs starting");

    let runner = QueryRunner::from_config(&client, client.project_id(), &config);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = match runner.run(&spec, &mut out, cli.format).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "query run failed");
            return Err(e).context("running query");
        }
    };
    out.flush().context("flushing output")?;

    if !summary.is_clean() {
        bail!(
            "{} of {} rows could not be decoded (job {})",
            summary.decode_failures,
            summary.total_rows,
            summary.job_id
        );
    }

    info!(job_id = %summary.job_id, rows = summary.rows_written, "result set complete");
    Ok(())
}
