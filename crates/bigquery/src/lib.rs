pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod paginate;
pub mod poll;
pub mod query;
pub mod result;
pub mod runner;
pub mod service;
pub mod submit;

pub use client::BigQueryClient;
pub use config::BigQueryConfig;
pub use decode::{decode_page, decode_row, DecodeError, DecodedRow};
pub use error::{ApiError, BigQueryError};
pub use paginate::{PageStream, Paginator};
pub use poll::{JobPoller, PollPolicy};
pub use query::{QuerySpec, UdfResource};
pub use result::{FieldMode, ResultPage, ResultSchema, SchemaField};
pub use runner::{OutputFormat, QueryRunner, RunSummary};
pub use service::{JobHandle, QueryService};
pub use submit::JobSubmitter;
