use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

use crate::error::TransferError;
use crate::models::{CycleEvent, CycleStatsSummary, PhaseResult};

pub mod csv;
pub mod json;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(TransferError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl ExportFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

fn create_output(output_path: &Path) -> Result<BufWriter<File>, TransferError> {
    let file = File::create(output_path).map_err(|e| TransferError::ExportFailed {
        path: output_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(BufWriter::new(file))
}

/// Export raw period history
pub fn export_history<P: AsRef<Path>>(
    events: &[CycleEvent],
    format: ExportFormat,
    output_path: P,
) -> Result<(), TransferError> {
    let writer = create_output(output_path.as_ref())?;
    match format {
        ExportFormat::Csv => csv::write_history(events, writer)?,
        ExportFormat::Json => json::write_json(&events, writer)?,
    }
    info!(path = %output_path.as_ref().display(), rows = events.len(), "Exported period history");
    Ok(())
}

/// Export a statistics summary
pub fn export_stats<P: AsRef<Path>>(
    summary: &CycleStatsSummary,
    format: ExportFormat,
    output_path: P,
) -> Result<(), TransferError> {
    let writer = create_output(output_path.as_ref())?;
    match format {
        ExportFormat::Csv => csv::write_stats(summary, writer)?,
        ExportFormat::Json => json::write_json(summary, writer)?,
    }
    info!(path = %output_path.as_ref().display(), "Exported cycle statistics");
    Ok(())
}

/// Export a day-by-day phase forecast
pub fn export_forecast<P: AsRef<Path>>(
    forecast: &[PhaseResult],
    format: ExportFormat,
    output_path: P,
) -> Result<(), TransferError> {
    let writer = create_output(output_path.as_ref())?;
    match format {
        ExportFormat::Csv => csv::write_forecast(forecast, writer)?,
        ExportFormat::Json => json::write_json(&forecast, writer)?,
    }
    info!(path = %output_path.as_ref().display(), days = forecast.len(), "Exported phase forecast");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(&PathBuf::from("history.csv")),
            Some(ExportFormat::Csv)
        );
        assert_eq!(ExportFormat::from_path(&PathBuf::from("history")), None);
    }

    #[test]
    fn test_unwritable_path() {
        let err = export_history(&[], ExportFormat::Csv, "/nonexistent-dir/out.csv").unwrap_err();
        assert!(matches!(err, TransferError::ExportFailed { .. }));
    }
}
