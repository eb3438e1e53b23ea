//! Raw document to canonical [`Record`] conversion
//!
//! Conversion is stateless and selected by a [`DocumentTag`], so the caller only needs to
//! know which system a body came from and which resource family it belongs to.

pub mod json;
pub mod legacy_xml;
pub mod xml;

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};
use crate::model::{Record, RecordKind};

/// Wire format served by a target system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Legacy XML API (`SummaryInfo` envelopes, 1-based pages)
    Xml,
    /// JSON/HAL API (`page` envelopes, 0-based pages)
    Json,
}

impl SourceFormat {
    /// `Accept` header sent with every request to a system of this format
    pub fn media_type(&self) -> &'static str {
        match self {
            SourceFormat::Xml => "text/xml",
            SourceFormat::Json => "application/hal+json",
        }
    }

    /// Number of the first page in a paginated listing
    pub fn first_page(&self) -> usize {
        match self {
            SourceFormat::Xml => 1,
            SourceFormat::Json => 0,
        }
    }

    /// Pagination query parameters understood by this format.
    ///
    /// `filter` fills the legacy `query` parameter; JSON listings have no equivalent.
    pub fn page_query(&self, page: usize, page_size: usize, filter: &str) -> Vec<(&'static str, String)> {
        match self {
            SourceFormat::Xml => vec![
                ("pagesize", page_size.to_string()),
                ("page", page.to_string()),
                ("query", filter.to_string()),
            ],
            SourceFormat::Json => vec![("size", page_size.to_string()), ("page", page.to_string())],
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Xml => f.write_str("xml"),
            SourceFormat::Json => f.write_str("json"),
        }
    }
}

/// Selects the conversion routine for a raw document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentTag {
    pub format: SourceFormat,
    pub kind: RecordKind,
}

impl DocumentTag {
    pub fn new(format: SourceFormat, kind: RecordKind) -> Self {
        Self { format, kind }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentConverter;

impl DocumentConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn convert(&self, tag: DocumentTag, raw: &str) -> ConversionResult<Record> {
        match (tag.format, tag.kind) {
            (SourceFormat::Xml, RecordKind::Sample) => legacy_xml::convert_sample(raw),
            (SourceFormat::Xml, RecordKind::Group) => legacy_xml::convert_group(raw),
            (SourceFormat::Json, _) => json::convert(raw),
        }
    }
}

/// Parse an ISO-8601 timestamp.
///
/// Values without an offset are taken as UTC; a bare date means midnight UTC.
pub fn parse_timestamp(field: &str, value: &str) -> ConversionResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        && let Some(midnight) = parsed.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }
    Err(ConversionError::InvalidTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse an optional timestamp, treating blank values as absent
pub(crate) fn parse_optional_timestamp(
    field: &str,
    value: Option<&str>,
) -> ConversionResult<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => parse_timestamp(field, value).map(Some),
        _ => Ok(None),
    }
}
