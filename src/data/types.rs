use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// One uploaded row before sanitization, as it arrives from a JSON payload
/// or a CSV upload.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// One sanitized row.
pub type Record = HashMap<String, CellValue>;

static NULL_CELL: CellValue = CellValue::Null;

/// A plain, backend-neutral cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    List(Vec<CellValue>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) if v.is_finite() => Some(*v),
            CellValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Key used to group rows into series. Nulls and lists never identify a series.
    pub fn series_key(&self) -> Option<String> {
        match self {
            CellValue::Null | CellValue::List(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, ""),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(v) => write!(f, "{}", v),
            CellValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
            CellValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A sanitized table: ordered column names plus rows keyed by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Cell at `column` for every row; absent cells read as null.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.rows.iter().map(move |row| row.get(name).unwrap_or(&NULL_CELL))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.columns.retain(|c| c != to);
        for column in self.columns.iter_mut() {
            if column == from {
                *column = to.to_string();
            }
        }
        for row in self.rows.iter_mut() {
            row.remove(to);
            if let Some(value) = row.remove(from) {
                row.insert(to.to_string(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_column_reads_missing_cells_as_null() {
        let dataset = Dataset::new(
            vec!["a".into(), "b".into()],
            vec![
                row(&[("a", CellValue::Int(1)), ("b", CellValue::Float(2.5))]),
                row(&[("a", CellValue::Int(2))]),
            ],
        );

        let b: Vec<&CellValue> = dataset.column("b").collect();
        assert_eq!(b, vec![&CellValue::Float(2.5), &CellValue::Null]);
    }

    #[test]
    fn test_rename_column_moves_values() {
        let mut dataset = Dataset::new(
            vec!["id".into(), "sales".into()],
            vec![row(&[("id", CellValue::Text("A".into())), ("sales", CellValue::Float(3.0))])],
        );

        dataset.rename_column("sales", "target");

        assert_eq!(dataset.columns, vec!["id".to_string(), "target".to_string()]);
        assert_eq!(dataset.rows[0].get("target"), Some(&CellValue::Float(3.0)));
        assert!(dataset.rows[0].get("sales").is_none());
    }

    #[test]
    fn test_series_key() {
        assert_eq!(CellValue::Int(7).series_key(), Some("7".to_string()));
        assert_eq!(CellValue::Text("store-1".into()).series_key(), Some("store-1".to_string()));
        assert_eq!(CellValue::Null.series_key(), None);
        assert_eq!(CellValue::List(vec![]).series_key(), None);
    }
}
