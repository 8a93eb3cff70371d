//! Caller-facing operations over a period log store
//!
//! Every call recomputes from the store; the engine holds no per-user state,
//! so concurrent calls for the same or different users are independent. The
//! only shared effect is the statistics cache upsert, where the last writer
//! wins.

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::dates::{days_between, format_date, today};
use crate::error::{CycleError, Result};
use crate::models::{CycleEvent, CycleOutlook, CycleStatsSummary, PhaseResult};
use crate::phase::PhasePredictor;
use crate::stats::CycleStatsCalculator;
use crate::store::PeriodLogStore;

/// Notes attached to a start when the caller supplies none
pub const DEFAULT_START_NOTE: &str = "Period started";

/// Cycle statistics and phase prediction over a log store
pub struct CycleEngine<S: PeriodLogStore> {
    store: S,
}

impl<S: PeriodLogStore> CycleEngine<S> {
    pub fn new(store: S) -> Self {
        CycleEngine { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current statistics for a user. Never fails: an unreadable history is
    /// treated as empty and a failed cache write is only logged.
    #[instrument(skip(self))]
    pub fn get_stats(&self, user_id: &str) -> CycleStatsSummary {
        let events = match self.store.list_events(user_id) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Could not read period history, using defaults");
                Vec::new()
            }
        };

        let summary = CycleStatsCalculator::calculate(&events);
        debug!(
            events = events.len(),
            confidence = %summary.confidence,
            avg_cycle_length = %summary.rounded_cycle_length(),
            "Computed cycle statistics"
        );

        if let Err(e) = self.store.upsert_stats_cache(user_id, &summary) {
            warn!(error = %e, "Failed to cache cycle statistics");
        }

        summary
    }

    /// Phase of `target` (today when absent)
    #[instrument(skip(self))]
    pub fn get_phase(&self, user_id: &str, target: Option<NaiveDate>) -> Result<PhaseResult> {
        let target = target.unwrap_or_else(today);
        let stats = self.get_stats(user_id);
        PhasePredictor::predict(user_id, &stats, target)
    }

    /// Phases for `days` consecutive dates from `start` (today when absent)
    #[instrument(skip(self))]
    pub fn forecast(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        days: u32,
    ) -> Result<Vec<PhaseResult>> {
        let start = start.unwrap_or_else(today);
        let stats = self.get_stats(user_id);
        PhasePredictor::forecast(user_id, &stats, start, days)
    }

    /// Days until the predicted next start as seen from `reference`
    #[instrument(skip(self))]
    pub fn outlook(&self, user_id: &str, reference: Option<NaiveDate>) -> Result<CycleOutlook> {
        let reference = reference.unwrap_or_else(today);
        let stats = self.get_stats(user_id);
        PhasePredictor::outlook(user_id, &stats, reference)
    }

    /// Record a new period start
    #[instrument(skip(self, notes))]
    pub fn log_start(
        &self,
        user_id: &str,
        start: NaiveDate,
        notes: Option<String>,
    ) -> Result<CycleEvent> {
        let event = CycleEvent::new(user_id, start)
            .with_notes(notes.unwrap_or_else(|| DEFAULT_START_NOTE.to_string()));

        self.store.insert_event(&event)?;
        info!(start_date = %event.start_date, "Logged period start");
        Ok(event)
    }

    /// Attach an end date to the period that started on `start`
    #[instrument(skip(self))]
    pub fn log_end(&self, user_id: &str, start: NaiveDate, end: NaiveDate) -> Result<()> {
        if days_between(start, end) < 0 {
            return Err(CycleError::InvalidRange {
                reason: format!("end {} precedes start {}", end, start),
            });
        }

        if !self.store.set_end_date(user_id, start, end)? {
            return Err(CycleError::EventNotFound {
                user_id: user_id.to_string(),
                start_date: format_date(start),
            });
        }

        info!(start_date = %start, end_date = %end, "Logged period end");
        Ok(())
    }

    /// Raw history as stored, newest first
    pub fn history(&self, user_id: &str) -> Result<Vec<CycleEvent>> {
        Ok(self.store.list_events(user_id)?)
    }

    /// Most recent valid start that has no end date yet
    pub fn latest_open_start(&self, user_id: &str) -> Result<Option<NaiveDate>> {
        let latest = self
            .history(user_id)?
            .iter()
            .filter(|event| event.end_date.is_none())
            .filter_map(CycleEvent::parsed_start)
            .max();
        Ok(latest)
    }
}
