//! Integration tests for bqjobs-bigquery.
//!
//! The whole submit → poll → paginate → decode workflow runs against a
//! scripted in-memory service; no credentials or network are needed.

mod mock;
mod runner;
