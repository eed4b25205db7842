use serde::{Deserialize, Serialize};

use crate::api::{TableFieldSchema, TableRow, TableSchema};

/// Column mode. NULLABLE when the service omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl FieldMode {
    fn parse(mode: Option<&str>) -> Self {
        match mode.map(str::to_ascii_uppercase).as_deref() {
            Some("REQUIRED") => FieldMode::Required,
            Some("REPEATED") => FieldMode::Repeated,
            _ => FieldMode::Nullable,
        }
    }
}

/// Column definition of a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Column name as declared in the result set.
    pub name: String,
    /// BigQuery type name (e.g. "INTEGER", "STRING", "TIMESTAMP", "RECORD").
    pub field_type: String,
    pub mode: FieldMode,
    /// Sub-fields of a RECORD column; empty otherwise.
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: FieldMode::Nullable,
            fields: Vec::new(),
        }
    }

    pub fn repeated(mut self) -> Self {
        self.mode = FieldMode::Repeated;
        self
    }

    pub fn with_fields(mut self, fields: Vec<SchemaField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_record(&self) -> bool {
        matches!(self.field_type.to_ascii_uppercase().as_str(), "RECORD" | "STRUCT")
    }
}

impl From<&TableFieldSchema> for SchemaField {
    fn from(f: &TableFieldSchema) -> Self {
        Self {
            name: f.name.clone(),
            field_type: f.field_type.clone(),
            mode: FieldMode::parse(f.mode.as_deref()),
            fields: f.fields.iter().map(SchemaField::from).collect(),
        }
    }
}

/// Ordered column list of a job's result set.
///
/// Read once from the metadata probe and reused for every page of the job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSchema {
    pub fields: Vec<SchemaField>,
}

impl ResultSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl From<&TableSchema> for ResultSchema {
    fn from(schema: &TableSchema) -> Self {
        Self {
            fields: schema.fields.iter().map(SchemaField::from).collect(),
        }
    }
}

/// One bounded slice of a job's result rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    /// Index of the first row of this page within the whole result set.
    pub start_index: u64,
    /// Rows requested for this page.
    pub page_size: u32,
    /// Authoritative total row count of the job.
    pub total_rows: u64,
    /// Rows in service order, cells aligned positionally with the schema.
    pub rows: Vec<TableRow>,
}

impl ResultPage {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index one past the last row of this page.
    pub fn end_index(&self) -> u64 {
        self.start_index + self.rows.len() as u64
    }
}
