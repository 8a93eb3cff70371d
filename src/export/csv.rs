use csv::Writer;
use std::io::Write;

use crate::dates::format_date;
use crate::error::TransferError;
use crate::models::{CycleEvent, CycleStatsSummary, PhaseResult};

/// Write period history as `start_date,end_date,notes`
pub fn write_history<W: Write>(events: &[CycleEvent], writer: W) -> Result<(), TransferError> {
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record(["start_date", "end_date", "notes"])?;

    for event in events {
        csv_writer.write_record([
            event.start_date.as_str(),
            event.end_date.as_deref().unwrap_or(""),
            event.notes.as_deref().unwrap_or(""),
        ])?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write a statistics summary as a single row
pub fn write_stats<W: Write>(summary: &CycleStatsSummary, writer: W) -> Result<(), TransferError> {
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record([
        "avg_cycle_length",
        "avg_event_duration",
        "last_start",
        "predicted_next_start",
        "confidence",
        "cycle_samples",
        "duration_samples",
    ])?;

    csv_writer.write_record([
        summary.rounded_cycle_length().to_string(),
        summary.rounded_event_duration().to_string(),
        summary.last_start.map(format_date).unwrap_or_default(),
        summary.predicted_next_start.map(format_date).unwrap_or_default(),
        summary.confidence.to_string(),
        summary.cycle_samples.to_string(),
        summary.duration_samples.to_string(),
    ])?;

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write one row per forecast day
pub fn write_forecast<W: Write>(forecast: &[PhaseResult], writer: W) -> Result<(), TransferError> {
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record(["date", "phase", "day_in_cycle", "cycle_length"])?;

    for day in forecast {
        csv_writer.write_record([
            format_date(day.target_date),
            day.phase.name().to_string(),
            day.day_in_cycle.to_string(),
            day.cycle_length.to_string(),
        ])?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhasePredictor;
    use crate::stats::CycleStatsCalculator;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_history_quotes_notes() {
        let events = vec![
            CycleEvent::new("alice", date(2024, 1, 1))
                .with_end(date(2024, 1, 5))
                .with_notes("heavy, \"day 2\""),
            CycleEvent::new("alice", date(2024, 1, 29)),
        ];

        let mut buffer = Vec::new();
        write_history(&events, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "start_date,end_date,notes");
        assert_eq!(lines[1], "2024-01-01,2024-01-05,\"heavy, \"\"day 2\"\"\"");
        assert_eq!(lines[2], "2024-01-29,,");
    }

    #[test]
    fn test_stats_row() {
        let stats = CycleStatsCalculator::calculate(&[
            CycleEvent::new("alice", date(2024, 1, 1)),
            CycleEvent::new("alice", date(2024, 1, 29)),
        ]);

        let mut buffer = Vec::new();
        write_stats(&stats, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.lines().nth(1).unwrap().starts_with("28.0,5.0,2024-01-29,2024-02-26,medium"));
    }

    #[test]
    fn test_forecast_rows() {
        let stats = CycleStatsCalculator::calculate(&[CycleEvent::new("alice", date(2024, 3, 1))]);
        let forecast = PhasePredictor::forecast("alice", &stats, date(2024, 3, 14), 3).unwrap();

        let mut buffer = Vec::new();
        write_forecast(&forecast, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "2024-03-14,Follicular,14,28");
        assert_eq!(lines[2], "2024-03-15,Ovulation,15,28");
    }
}
