use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::debug;

use crate::data::types::{CellValue, Dataset, RawRecord, Record};
use crate::forecast::error::InputError;

/// Strings that mean "no value" in uploaded files (compared case-insensitively).
const NA_SENTINELS: &[&str] = &["", "nan", "na", "n/a", "<na>", "null", "none", "nat"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Coerce uploaded rows into plain typed cells.
///
/// Every cell is normalized (arrays become lists, JSON numbers become plain
/// integers or floats, NA sentinels become null). The timestamp column is
/// parsed to point-in-time values and the target column to floats; anything
/// that does not parse becomes null. This never fails on malformed cells.
pub fn sanitize(rows: &[RawRecord], timestamp_column: &str, target_column: &str) -> Dataset {
    let mut columns: Vec<String> = Vec::new();
    let mut cleaned: Vec<Record> = Vec::with_capacity(rows.len());
    let mut bad_timestamps = 0usize;
    let mut bad_targets = 0usize;

    for raw in rows {
        let mut record = Record::with_capacity(raw.len());
        for (name, value) in raw {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.clone());
            }

            let mut cell = sanitize_cell(value);
            if name == timestamp_column {
                let parsed = parse_timestamp(&cell);
                if parsed.is_none() && !cell.is_null() {
                    bad_timestamps += 1;
                }
                cell = parsed.map(CellValue::Timestamp).unwrap_or(CellValue::Null);
            } else if name == target_column {
                let parsed = parse_target(&cell);
                if parsed.is_none() && !cell.is_null() {
                    bad_targets += 1;
                }
                cell = parsed.map(CellValue::Float).unwrap_or(CellValue::Null);
            }
            record.insert(name.clone(), cell);
        }
        cleaned.push(record);
    }

    if bad_timestamps > 0 || bad_targets > 0 {
        debug!(
            bad_timestamps,
            bad_targets, "Coerced unparseable cells to null during sanitization"
        );
    }

    Dataset::new(columns, cleaned)
}

/// Normalize a single uploaded value into a plain cell.
pub fn sanitize_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Int(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => CellValue::Float(f),
                    _ => CellValue::Null,
                }
            }
        }
        Value::String(s) => {
            if is_na_sentinel(s) {
                CellValue::Null
            } else {
                CellValue::Text(s.clone())
            }
        }
        Value::Array(items) => CellValue::List(items.iter().map(sanitize_cell).collect()),
        Value::Object(_) => CellValue::Text(value.to_string()),
    }
}

fn is_na_sentinel(s: &str) -> bool {
    let trimmed = s.trim();
    NA_SENTINELS.iter().any(|na| trimmed.eq_ignore_ascii_case(na))
}

pub fn parse_timestamp(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Timestamp(ts) => Some(*ts),
        CellValue::Text(s) => parse_timestamp_str(s),
        CellValue::Int(v) => parse_compact_date(*v),
        _ => None,
    }
}

/// Dates like `20240101` that arrive as integers after type inference.
fn parse_compact_date(value: i64) -> Option<NaiveDateTime> {
    if !(10_000_101..=99_991_231).contains(&value) {
        return None;
    }
    NaiveDate::parse_from_str(&value.to_string(), "%Y%m%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Parse a timestamp string. Offsets are converted to UTC and dropped.
pub fn parse_timestamp_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

pub fn parse_target(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Float(_) | CellValue::Int(_) => cell.as_f64(),
        CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Structural check: every named column must exist in the dataset.
pub fn require_columns(dataset: &Dataset, columns: &[&str]) -> Result<(), InputError> {
    for column in columns {
        if !dataset.has_column(column) {
            return Err(InputError::MissingColumn(column.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<RawRecord> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_unparseable_timestamps_become_null() {
        let rows = records(json!([
            {"id": "A", "date": "2024-01-01", "value": 1.0},
            {"id": "A", "date": "not a date", "value": 2.0},
            {"id": "A", "date": "2024-01-03 06:30:00", "value": 3.0},
            {"id": "A", "date": 17, "value": 4.0},
        ]));

        let dataset = sanitize(&rows, "date", "value");
        let dates: Vec<&CellValue> = dataset.column("date").collect();

        assert_eq!(dates[0], &CellValue::Timestamp(ts("2024-01-01 00:00:00")));
        assert_eq!(dates[1], &CellValue::Null);
        assert_eq!(dates[2], &CellValue::Timestamp(ts("2024-01-03 06:30:00")));
        assert_eq!(dates[3], &CellValue::Null);
    }

    #[test]
    fn test_non_numeric_target_becomes_null() {
        let rows = records(json!([
            {"id": "A", "date": "2024-01-01", "value": "12.5"},
            {"id": "A", "date": "2024-01-02", "value": "oops"},
            {"id": "A", "date": "2024-01-03", "value": 7},
            {"id": "A", "date": "2024-01-04", "value": null},
        ]));

        let dataset = sanitize(&rows, "date", "value");
        let values: Vec<&CellValue> = dataset.column("value").collect();

        assert_eq!(values[0], &CellValue::Float(12.5));
        assert_eq!(values[1], &CellValue::Null);
        assert_eq!(values[2], &CellValue::Float(7.0));
        assert_eq!(values[3], &CellValue::Null);
    }

    #[test]
    fn test_generic_cells_are_plain_values() {
        let rows = records(json!([
            {"tags": [1, "x", null], "count": 3, "ratio": 0.25, "note": "NaN", "flag": true},
        ]));

        let dataset = sanitize(&rows, "date", "value");
        let row = &dataset.rows[0];

        assert_eq!(
            row.get("tags"),
            Some(&CellValue::List(vec![
                CellValue::Int(1),
                CellValue::Text("x".into()),
                CellValue::Null
            ]))
        );
        assert_eq!(row.get("count"), Some(&CellValue::Int(3)));
        assert_eq!(row.get("ratio"), Some(&CellValue::Float(0.25)));
        assert_eq!(row.get("note"), Some(&CellValue::Null));
        assert_eq!(row.get("flag"), Some(&CellValue::Bool(true)));
    }

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        let parsed = parse_timestamp_str("2024-03-10T12:00:00+02:00").unwrap();
        assert_eq!(parsed, ts("2024-03-10 10:00:00"));
    }

    #[test]
    fn test_alternate_date_layouts() {
        assert_eq!(parse_timestamp_str("2024/02/29"), Some(ts("2024-02-29 00:00:00")));
        assert_eq!(parse_timestamp_str("02/29/2024"), Some(ts("2024-02-29 00:00:00")));
        assert_eq!(parse_timestamp_str("2024-02-30"), None);
    }

    #[test]
    fn test_compact_integer_dates_are_parsed() {
        let rows = records(json!([
            {"date": 20240101, "value": 1},
            {"date": 20240230, "value": 2},
            {"date": "20240103", "value": 3},
        ]));

        let dataset = sanitize(&rows, "date", "value");
        let dates: Vec<&CellValue> = dataset.column("date").collect();

        assert_eq!(dates[0], &CellValue::Timestamp(ts("2024-01-01 00:00:00")));
        assert_eq!(dates[1], &CellValue::Null);
        assert_eq!(dates[2], &CellValue::Timestamp(ts("2024-01-03 00:00:00")));
    }

    #[test]
    fn test_columns_keep_first_seen_order() {
        let rows = records(json!([{"b": 1}, {"a": 2, "b": 3}]));
        let dataset = sanitize(&rows, "a", "b");
        assert!(dataset.has_column("a"));
        assert!(dataset.has_column("b"));
        assert_eq!(dataset.columns.len(), 2);
    }

    #[test]
    fn test_require_columns_names_missing_column() {
        let rows = records(json!([{"id": "A", "date": "2024-01-01"}]));
        let dataset = sanitize(&rows, "date", "value");

        let err = require_columns(&dataset, &["id", "date", "value"]).unwrap_err();
        assert!(matches!(err, InputError::MissingColumn(ref c) if c == "value"));
    }
}
