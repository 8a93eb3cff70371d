use serde::{Deserialize, Serialize};

pub mod csv;

/// A source row that could not become an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 1-based line in the source file, header included
    pub line: u64,
    pub reason: String,
}

/// Outcome of importing a period history file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows stored as new events
    pub inserted: usize,

    /// Rows whose start date was already logged
    pub duplicates: usize,

    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    pub fn total_rows(&self) -> usize {
        self.inserted + self.duplicates + self.rejected.len()
    }
}
