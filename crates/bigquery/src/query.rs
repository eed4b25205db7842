use serde::{Deserialize, Serialize};

use crate::api::{Job, JobConfiguration, JobConfigurationQuery, UserDefinedFunctionResource};

/// Expands a `[start, end)` unix-seconds range into one row per UTC hour.
pub const CALENDAR_QUERY: &str = r#"SELECT Year, Month, Day, Hour FROM (Calendar(SELECT "1494114399" AS start, "1494144399" AS end))"#;

/// Legacy-SQL JavaScript UDF backing [`CALENDAR_QUERY`].
pub const CALENDAR_UDF: &str = r#"
function Calendar(row, emit) {
  var startTime = new Date(row.start * 1000), endTime = new Date(row.end * 1000);
  while (endTime > startTime) {
    emit({Year: startTime.getUTCFullYear(), Month: startTime.getUTCMonth() + 1,
          Day: startTime.getUTCDate(), Hour: startTime.getUTCHours()});
    startTime.setTime(startTime.getTime() + 60 * 60 * 1000);
  }
}

bigquery.defineFunction(
  'Calendar',
  ['start', 'end'],
  [{'name': 'Year', 'type': 'integer'},
   {'name': 'Month', 'type': 'integer'},
   {'name': 'Day', 'type': 'integer'},
   {'name': 'Hour', 'type': 'integer'}],
  Calendar
);"#;

/// Source of a user-defined function attached to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UdfResource {
    /// Function source embedded in the request.
    Inline(String),
    /// Cloud Storage URI of a file holding the source (`gs://bucket/udf.js`).
    Uri(String),
}

impl From<&UdfResource> for UserDefinedFunctionResource {
    fn from(resource: &UdfResource) -> Self {
        match resource {
            UdfResource::Inline(code) => UserDefinedFunctionResource {
                inline_code: Some(code.clone()),
                resource_uri: None,
            },
            UdfResource::Uri(uri) => UserDefinedFunctionResource {
                inline_code: None,
                resource_uri: Some(uri.clone()),
            },
        }
    }
}

/// Query text plus the UDFs it calls. Immutable once built.
///
/// UDF sources are passed through verbatim; syntax is checked by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    query: String,
    udfs: Vec<UdfResource>,
    use_legacy_sql: bool,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>, udfs: Vec<UdfResource>, use_legacy_sql: bool) -> Self {
        Self {
            query: query.into(),
            udfs,
            use_legacy_sql,
        }
    }

    /// The built-in calendar expansion query with its inline UDF.
    pub fn calendar() -> Self {
        Self::new(
            CALENDAR_QUERY,
            vec![UdfResource::Inline(CALENDAR_UDF.to_string())],
            true,
        )
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn udfs(&self) -> &[UdfResource] {
        &self.udfs
    }

    pub fn use_legacy_sql(&self) -> bool {
        self.use_legacy_sql
    }

    /// Build the `jobs.insert` request body.
    pub fn to_job_request(&self) -> Job {
        Job {
            configuration: Some(JobConfiguration {
                query: Some(JobConfigurationQuery {
                    query: self.query.clone(),
                    use_legacy_sql: Some(self.use_legacy_sql),
                    user_defined_function_resources: self.udfs.iter().map(Into::into).collect(),
                }),
            }),
            ..Job::default()
        }
    }
}
