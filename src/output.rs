//! Result types: per-form extraction results, the assembled dataset and run stats.
//!
//! [`Dataset`] is the terminal product of a run. It owns the [`FieldSchema`]
//! so its CSV columns are exactly the schema, in schema order, and it keeps
//! rows in the order forms were paired. Rows are never dropped, reordered or
//! deduplicated.

use crate::error::{FormError, FormExtractError};
use crate::schema::FieldSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::io::Write;

/// Value stored for a field the reply did not resolve.
pub const NOT_AVAILABLE: &str = "N/A";

/// One form's answers: exactly one value per schema field, kept in schema
/// order. Serialises as a map in that same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    values: Vec<(String, String)>,
}

impl ExtractionResult {
    /// A result with every field of `schema` set to [`NOT_AVAILABLE`].
    pub fn unresolved(schema: &FieldSchema) -> Self {
        Self {
            values: schema
                .iter()
                .map(|f| (f.clone(), NOT_AVAILABLE.to_string()))
                .collect(),
        }
    }

    /// Overwrite the value of a known field. Unknown names are ignored so the
    /// key set always stays equal to the schema.
    pub(crate) fn set(&mut self, field: &str, value: String) {
        if let Some((_, slot)) = self.values.iter_mut().find(|(f, _)| f == field) {
            *slot = value;
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Number of fields holding something other than `N/A`.
    pub fn resolved_count(&self) -> usize {
        self.values
            .iter()
            .filter(|(_, v)| v != NOT_AVAILABLE)
            .count()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Field names in schema order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(f, _)| f.as_str())
    }

    /// Values in `schema` order; `N/A` for anything missing.
    pub fn values_in<'a>(&'a self, schema: &'a FieldSchema) -> impl Iterator<Item = &'a str> {
        schema
            .iter()
            .map(move |f| self.get(f).unwrap_or(NOT_AVAILABLE))
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Ordered rows of extraction results, one per processed form pair.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    schema: FieldSchema,
    rows: Vec<ExtractionResult>,
}

impl Dataset {
    pub fn new(schema: FieldSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Append a row; arrival order is output order.
    pub fn push(&mut self, row: ExtractionResult) {
        debug_assert_eq!(row.len(), self.schema.len());
        self.rows.push(row);
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[ExtractionResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the dataset as CSV: header row, then one record per row.
    ///
    /// Comma-delimited, `\n`-terminated, values quoted only when they contain
    /// a comma, a quote or a line break (quotes doubled).
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), FormExtractError> {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);

        wtr.write_record(self.schema.iter())
            .map_err(|e| FormExtractError::CsvWriteFailed(e.to_string()))?;
        for row in &self.rows {
            wtr.write_record(row.values_in(&self.schema))
                .map_err(|e| FormExtractError::CsvWriteFailed(e.to_string()))?;
        }
        wtr.flush()
            .map_err(|e| FormExtractError::CsvWriteFailed(e.to_string()))
    }

    /// Serialise to UTF-8 CSV bytes.
    pub fn to_csv(&self) -> Result<Vec<u8>, FormExtractError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub dataset: Dataset,
    /// Forms whose reply was unusable; their rows are all `N/A`.
    pub form_errors: Vec<FormError>,
    pub stats: ExtractionStats,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages rendered from the PDF.
    pub total_pages: usize,
    /// Form pairs sent to the vision model (= rows in the dataset).
    pub forms: usize,
    /// Trailing pages that could not be paired and were dropped.
    pub discarded_pages: usize,
    /// Forms whose reply envelope was malformed.
    pub malformed_replies: usize,
    /// Fields resolved to a value across all rows.
    pub resolved_fields: usize,
    /// Fields left as `N/A` across all rows.
    pub unresolved_fields: usize,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::inspect`] reports about a PDF without calling the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Complete two-page forms the document holds.
    pub form_count: usize,
    /// Whether the last page has no partner and would be dropped.
    pub has_trailing_page: bool,
    pub pdf_version: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: Option<String>,
}

impl DocumentInfo {
    pub fn from_page_count(page_count: usize) -> Self {
        Self {
            page_count,
            form_count: page_count / 2,
            has_trailing_page: page_count % 2 == 1,
            pdf_version: String::new(),
            title: None,
            author: None,
            producer: None,
        }
    }
}
