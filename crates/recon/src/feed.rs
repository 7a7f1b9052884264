//! Feed parsers: turn exported text into [`RawRecord`]s.
//!
//! Only the container shape is checked here. A feed that is not a list of
//! flat records fails as a whole with [`ReconError::Structural`]; field
//! content is left to the validator.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ReconError;
use crate::model::{FeedKind, FieldValue, RawRecord};

/// Supported on-disk layouts for one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Csv,
    /// A single JSON array of objects.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl FeedFormat {
    /// Pick a format from a file extension (`csv`, `json`, `jsonl`, `ndjson`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

pub fn parse_feed(kind: FeedKind, format: FeedFormat, data: &str) -> Result<Vec<RawRecord>, ReconError> {
    match format {
        FeedFormat::Csv => parse_csv_feed(kind, data),
        FeedFormat::Json => parse_json_feed(kind, data),
        FeedFormat::JsonLines => parse_jsonl_feed(kind, data),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Parse a headed CSV export. Empty cells become [`FieldValue::Null`].
pub fn parse_csv_feed(kind: FeedKind, csv_data: &str) -> Result<Vec<RawRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::structural(kind, e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    for h in &headers {
        if h.is_empty() {
            return Err(ReconError::structural(kind, "header row has an empty column name"));
        }
        if !seen.insert(h.as_str()) {
            return Err(ReconError::structural(kind, format!("column '{h}' appears more than once")));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::structural(kind, e.to_string()))?;
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| {
                let value = if cell.trim().is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Text(cell.to_string())
                };
                (h.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Parse a JSON array of flat objects.
pub fn parse_json_feed(kind: FeedKind, json: &str) -> Result<Vec<RawRecord>, ReconError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ReconError::structural(kind, format!("invalid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(ReconError::structural(kind, "expected a JSON array of records"));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| record_from_json(kind, i + 1, item))
        .collect()
}

/// Parse line-delimited JSON objects. Blank lines are skipped.
pub fn parse_jsonl_feed(kind: FeedKind, jsonl: &str) -> Result<Vec<RawRecord>, ReconError> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: Value = serde_json::from_str(line).map_err(|e| {
                ReconError::structural(kind, format!("line {}: invalid JSON: {e}", i + 1))
            })?;
            record_from_json(kind, i + 1, value)
        })
        .collect()
}

fn record_from_json(kind: FeedKind, row: usize, item: Value) -> Result<RawRecord, ReconError> {
    let Value::Object(map) = item else {
        return Err(ReconError::structural(kind, format!("record {row} is not an object")));
    };
    map.into_iter()
        .map(|(key, value)| {
            let field = match value {
                Value::Null => FieldValue::Null,
                Value::Bool(b) => FieldValue::Bool(b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => FieldValue::Int(i),
                    None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                Value::String(s) => FieldValue::Text(s),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ReconError::structural(
                        kind,
                        format!("record {row}, field '{key}' is not a primitive value"),
                    ));
                }
            };
            Ok((key, field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_basic() {
        let csv = "\
id,sender,recipient,body,sent_at
m1,A,B,Hi,2026-01-15T10:00:00Z
m2,A,B,,2026-01-15T10:00:30Z
";
        let rows = parse_csv_feed(FeedKind::Messages, csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&FieldValue::from("m1")));
        assert_eq!(rows[1].get("body"), Some(&FieldValue::Null));
    }

    #[test]
    fn csv_ragged_row_is_structural() {
        let csv = "id,sent_at\nm1,2026-01-15\nm2\n";
        let err = parse_csv_feed(FeedKind::Messages, csv).unwrap_err();
        assert!(matches!(err, ReconError::Structural { feed: FeedKind::Messages, .. }));
    }

    #[test]
    fn csv_duplicate_header_is_structural() {
        let err = parse_csv_feed(FeedKind::Statuses, "status,status\nsent,read\n").unwrap_err();
        assert!(err.to_string().contains("'status'"));
        assert!(err.to_string().starts_with("statuses feed is malformed"));
    }

    #[test]
    fn csv_headers_only_is_empty_feed() {
        let rows = parse_csv_feed(FeedKind::Statuses, "message_id,status,timestamp\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn json_array() {
        let json = r#"[
            {"id": 7, "sender": "A", "sent_at": "2026-01-15T10:00:00Z", "score": 0.5, "flag": true},
            {"id": "m2", "sender": null}
        ]"#;
        let rows = parse_json_feed(FeedKind::Messages, json).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&FieldValue::Int(7)));
        assert_eq!(rows[0].get("score"), Some(&FieldValue::Float(0.5)));
        assert_eq!(rows[0].get("flag"), Some(&FieldValue::Bool(true)));
        assert_eq!(rows[1].get("sender"), Some(&FieldValue::Null));
    }

    #[test]
    fn json_not_array_is_structural() {
        let err = parse_json_feed(FeedKind::Messages, r#"{"id": "m1"}"#).unwrap_err();
        assert!(err.to_string().contains("expected a JSON array"));
    }

    #[test]
    fn json_non_object_row_is_structural() {
        let err = parse_json_feed(FeedKind::Messages, r#"[{"id": "m1"}, 42]"#).unwrap_err();
        assert!(err.to_string().contains("record 2 is not an object"));
    }

    #[test]
    fn json_nested_value_is_structural() {
        let err = parse_json_feed(FeedKind::Statuses, r#"[{"status": ["sent"]}]"#).unwrap_err();
        assert!(err.to_string().contains("field 'status'"));
    }

    #[test]
    fn json_garbage_is_structural() {
        let err = parse_json_feed(FeedKind::Statuses, "not json").unwrap_err();
        assert!(matches!(err, ReconError::Structural { .. }));
    }

    #[test]
    fn jsonl_lines() {
        let jsonl = "{\"message_id\": \"m1\", \"status\": \"sent\"}\n\n{\"message_id\": \"m1\", \"status\": \"read\"}\n";
        let rows = parse_jsonl_feed(FeedKind::Statuses, jsonl).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("status"), Some(&FieldValue::from("read")));
    }

    #[test]
    fn jsonl_bad_line_reports_line_number() {
        let err = parse_jsonl_feed(FeedKind::Statuses, "{}\n[1,2]\n").unwrap_err();
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(FeedFormat::from_extension("CSV"), Some(FeedFormat::Csv));
        assert_eq!(FeedFormat::from_extension("ndjson"), Some(FeedFormat::JsonLines));
        assert_eq!(FeedFormat::from_extension("xlsx"), None);
    }
}
