use serde_json::{Number, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

use crate::data::types::RawRecord;
use crate::forecast::error::InputError;

/// An uploaded CSV: header order plus raw rows ready for sanitization.
#[derive(Debug, Clone, Default)]
pub struct CsvUpload {
    pub filename: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl CsvUpload {
    /// First few rows, for previewing an upload before column selection.
    pub fn preview(&self, limit: usize) -> &[RawRecord] {
        &self.rows[..self.rows.len().min(limit)]
    }
}

pub fn load_csv_file(path: &Path) -> Result<CsvUpload, InputError> {
    let file = File::open(path)?;
    let mut upload = read_csv(BufReader::new(file))?;
    upload.filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    info!(
        "Loaded {} rows x {} columns from {}",
        upload.rows.len(),
        upload.columns.len(),
        path.display()
    );
    Ok(upload)
}

pub fn read_csv<R: Read>(reader: R) -> Result<CsvUpload, InputError> {
    let mut reader = csv::Reader::from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| InputError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(InputError::Csv("file has no header row".into()));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| InputError::Csv(e.to_string()))?;
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(name, field)| (name.clone(), infer_cell(field)))
            .collect();
        rows.push(row);
    }

    Ok(CsvUpload {
        filename: None,
        columns: headers,
        rows,
    })
}

/// Numeric-looking fields become JSON numbers; everything else stays text.
fn infer_cell(field: &str) -> Value {
    let trimmed = field.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(field.to_string())
}
