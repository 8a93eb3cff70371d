use csv::{ErrorKind, ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::dates::{days_between, parse_date};
use crate::error::{CycleError, StoreError, TransferError};
use crate::import::{ImportReport, RejectedRow};
use crate::models::CycleEvent;
use crate::store::PeriodLogStore;

/// CSV importer with flexible column naming
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvImporter {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(
            &mut column_mapping,
            "start_date",
            &["start_date", "start", "started", "period_start", "startdate"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "end_date",
            &["end_date", "end", "ended", "period_end", "enddate"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "notes",
            &["notes", "note", "comment", "comments"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Parse rows into events for `user_id`, collecting rejected rows
    pub fn read_events<R: Read>(
        &self,
        reader: R,
        user_id: &str,
    ) -> Result<(Vec<CycleEvent>, Vec<RejectedRow>), TransferError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| self.normalize_column_name(h))
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let start_idx = column("start_date").ok_or_else(|| TransferError::MissingColumn {
            column: "start_date".to_string(),
        })?;
        let end_idx = column("end_date");
        let notes_idx = column("notes");

        let mut events = Vec::new();
        let mut rejected = Vec::new();

        for (index, record) in csv_reader.records().enumerate() {
            // header is line 1
            let line = index as u64 + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    let reason = format!("unreadable row: {}", e);
                    debug!(line, %reason, "Rejected import row");
                    rejected.push(RejectedRow { line, reason });
                    continue;
                }
            };

            match Self::event_from_record(&record, user_id, start_idx, end_idx, notes_idx) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    debug!(line, %reason, "Rejected import row");
                    rejected.push(RejectedRow { line, reason });
                }
            }
        }

        Ok((events, rejected))
    }

    fn event_from_record(
        record: &StringRecord,
        user_id: &str,
        start_idx: usize,
        end_idx: Option<usize>,
        notes_idx: Option<usize>,
    ) -> Result<CycleEvent, String> {
        let field = |idx: Option<usize>| -> Option<&str> {
            idx.and_then(|i| record.get(i))
                .filter(|value| !value.is_empty())
        };

        let raw_start = field(Some(start_idx)).ok_or("missing start date")?;
        let start = parse_date(raw_start).ok_or_else(|| format!("invalid start date '{}'", raw_start))?;

        let mut event = CycleEvent::new(user_id, start);

        if let Some(raw_end) = field(end_idx) {
            let end = parse_date(raw_end).ok_or_else(|| format!("invalid end date '{}'", raw_end))?;
            if days_between(start, end) < 0 {
                return Err(format!("end date {} precedes start date {}", end, start));
            }
            event = event.with_end(end);
        }

        if let Some(notes) = field(notes_idx) {
            event = event.with_notes(notes);
        }

        Ok(event)
    }

    /// Import a CSV file into the store; already-logged starts are skipped
    pub fn import_file<P, S>(
        &self,
        path: P,
        user_id: &str,
        store: &S,
    ) -> Result<ImportReport, CycleError>
    where
        P: AsRef<Path>,
        S: PeriodLogStore,
    {
        let file = std::fs::File::open(path.as_ref())?;
        let (events, rejected) = self.read_events(file, user_id)?;

        let mut report = ImportReport {
            rejected,
            ..ImportReport::default()
        };

        for event in &events {
            match store.insert_event(event) {
                Ok(()) => report.inserted += 1,
                Err(StoreError::Duplicate { .. }) => report.duplicates += 1,
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            path = %path.as_ref().display(),
            inserted = report.inserted,
            duplicates = report.duplicates,
            rejected = report.rejected.len(),
            "Imported period history"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_header_aliases() {
        let data = "Start,End Date,Comment\n2024-01-01,2024-01-05,first\n2024-01-29,,\n";
        let (events, rejected) = CsvImporter::new().read_events(data.as_bytes(), "alice").unwrap();

        assert!(rejected.is_empty());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].end_date.as_deref(), Some("2024-01-05"));
        assert_eq!(events[0].notes.as_deref(), Some("first"));
        assert_eq!(events[1].end_date, None);
        assert_eq!(events[1].user_id, "alice");
    }

    #[test]
    fn test_rejects_bad_rows_with_line_numbers() {
        let data = "start_date,end_date\nyesterday,\n2024-01-10,2024-01-08\n2024-02-01,2024-02-05\n";
        let (events, rejected) = CsvImporter::new().read_events(data.as_bytes(), "alice").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].line, 2);
        assert!(rejected[0].reason.contains("yesterday"));
        assert_eq!(rejected[1].line, 3);
    }

    #[test]
    fn test_undecodable_row_is_rejected_not_fatal() {
        let data: &[u8] = b"start_date,notes\n2024-01-01,ok\n2024-01-29,\xff\xfe\n2024-02-26,\n";
        let (events, rejected) = CsvImporter::new().read_events(data, "alice").unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].start_date, "2024-02-26");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].line, 3);
        assert!(rejected[0].reason.starts_with("unreadable row"));
    }

    #[test]
    fn test_missing_start_column() {
        let data = "date,notes\n2024-01-01,x\n";
        let err = CsvImporter::new().read_events(data.as_bytes(), "alice").unwrap_err();
        assert!(matches!(err, TransferError::MissingColumn { .. }));
    }

    #[test]
    fn test_import_file_counts_duplicates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "start_date,end_date,notes").unwrap();
        writeln!(file, "2024-01-01,2024-01-05,").unwrap();
        writeln!(file, "2024-01-29,,").unwrap();
        writeln!(file, "2024-01-29,2024-02-02,again").unwrap();
        writeln!(file, "bad,,").unwrap();

        let store = MemoryStore::new();
        let report = CsvImporter::new()
            .import_file(file.path(), "alice", &store)
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.total_rows(), 4);
        assert_eq!(store.list_events("alice").unwrap().len(), 2);
    }
}
