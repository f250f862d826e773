use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::forecast::service::{ForecastResponse, ForecastStatus};
use crate::forecast::types::ForecastTable;
use crate::monitoring::compare::ComparisonRow;

/// Write a forecast table as `timestamp,mean,p10,p90`.
pub fn write_forecast_csv<W: Write>(table: &ForecastTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["timestamp", "mean", "p10", "p90"])?;
    for row in table.rows() {
        wtr.write_record([
            row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            row.mean.to_string(),
            row.p10.to_string(),
            row.p90.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_forecast(table: &ForecastTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_forecast_csv(table, file)
}

/// Write comparison rows; uncovered dates show `-` for forecast and error.
pub fn write_comparison_csv<W: Write>(rows: &[ComparisonRow], writer: W) -> Result<()> {
    let dash = || "-".to_string();
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["date", "value", "forecast", "error", "anomaly"])?;
    for row in rows {
        wtr.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.value.to_string(),
            row.forecast.map(|v| format!("{:.2}", v)).unwrap_or_else(dash),
            row.error.map(|v| format!("{:.2}", v)).unwrap_or_else(dash),
            if row.anomaly { "Yes" } else { "" }.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Appends one line per forecast run to a CSV audit file.
pub struct RunLogger {
    log_path: PathBuf,
}

impl RunLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)
                .with_context(|| format!("Failed to create run log {}", log_path.display()))?;

            writeln!(file, "timestamp,model,source,horizon,rows,status")?;
        }

        Ok(Self { log_path })
    }

    pub fn log_run(
        &self,
        model: &str,
        source: &str,
        horizon: usize,
        response: &ForecastResponse,
    ) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.log_path)?;
        let status = match response.status() {
            ForecastStatus::Success => "success",
            ForecastStatus::Failed => "failed",
        };

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record([
            Utc::now().to_rfc3339(),
            model.to_string(),
            source.to_string(),
            horizon.to_string(),
            response.forecast.len().to_string(),
            status.to_string(),
        ])?;
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::types::ForecastRow;
    use crate::monitoring::capture::DiagnosticLog;
    use chrono::NaiveDate;

    fn table() -> ForecastTable {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ForecastTable::new(vec![ForecastRow::new(ts, 10.5, 9.0, 12.0)])
    }

    #[test]
    fn test_forecast_csv_layout() {
        let mut out = Vec::new();
        write_forecast_csv(&table(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "timestamp,mean,p10,p90\n2024-06-01 00:00:00,10.5,9,12\n"
        );
    }

    #[test]
    fn test_comparison_csv_marks_missing_and_anomalies() {
        let rows = vec![
            ComparisonRow {
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                value: 20.0,
                forecast: Some(10.5),
                error: Some(9.5),
                anomaly: true,
            },
            ComparisonRow {
                date: NaiveDate::from_ymd_opt(2024, 6, 9).unwrap(),
                value: 3.0,
                forecast: None,
                error: None,
                anomaly: false,
            },
        ];
        let mut out = Vec::new();
        write_comparison_csv(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2024-06-01,20,10.50,9.50,Yes"));
        assert!(text.contains("2024-06-09,3,-,-,\n"));
    }

    #[test]
    fn test_run_logger_appends_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.csv");
        let logger = RunLogger::new(&path).unwrap();
        let response = ForecastResponse {
            forecast: table(),
            log: DiagnosticLog::new(),
        };

        logger.log_run("lag-llama", "sales.csv", 1, &response).unwrap();
        logger.log_run("lag-llama", "sales.csv", 1, &response).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,model"));
        assert!(lines[1].ends_with("lag-llama,sales.csv,1,1,success"));
    }
}
