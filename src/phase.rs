use chrono::NaiveDate;

use crate::dates::{add_days, days_between, floor_mod};
use crate::error::CycleError;
use crate::models::{CycleOutlook, CycleStatsSummary, Phase, PhaseResult};

/// Day offsets (0-based) at which each later phase ends.
///
/// These are absolute days of a canonical 28-day cycle and are not rescaled
/// for longer or shorter cycles.
pub const FOLLICULAR_END: u32 = 14;
pub const OVULATION_END: u32 = 16;
pub const LUTEAL_END: u32 = 22;

/// Days before the predicted start that count as the PMS window
pub const PMS_WINDOW_BEFORE: i64 = 7;

/// Days after a missed predicted start that still count as the PMS window
pub const PMS_WINDOW_AFTER: i64 = 2;

/// Phase classification over a statistics summary
pub struct PhasePredictor;

impl PhasePredictor {
    /// Classify a 0-based day offset. First match wins, so a period length of
    /// 14 or more swallows the follicular band entirely.
    pub fn classify(day_offset: u32, period_length: u32) -> Phase {
        if day_offset < period_length {
            Phase::Menstruation
        } else if day_offset < FOLLICULAR_END {
            Phase::Follicular
        } else if day_offset < OVULATION_END {
            Phase::Ovulation
        } else if day_offset < LUTEAL_END {
            Phase::Luteal
        } else {
            Phase::PmsWeek
        }
    }

    /// 0-based offset of `target` within its cycle, using floor-modulo so
    /// dates before the last start still land in `[0, cycle_length)`
    pub fn day_offset(last_start: NaiveDate, target: NaiveDate, cycle_length: u32) -> u32 {
        let days_since = days_between(last_start, target);
        floor_mod(days_since, i64::from(cycle_length.max(1))) as u32
    }

    /// Classify `target` against the statistics of one user
    pub fn predict(
        user_id: &str,
        stats: &CycleStatsSummary,
        target: NaiveDate,
    ) -> Result<PhaseResult, CycleError> {
        let last_start = Self::require_last_start(user_id, stats)?;
        let cycle_length = stats.cycle_length_days();
        let day_offset = Self::day_offset(last_start, target, cycle_length);
        let phase = Self::classify(day_offset, stats.period_length_days());

        Ok(PhaseResult {
            target_date: target,
            phase,
            day_in_cycle: day_offset + 1,
            cycle_length,
            stats: stats.clone(),
        })
    }

    /// Phases for `days` consecutive dates starting at `start`
    pub fn forecast(
        user_id: &str,
        stats: &CycleStatsSummary,
        start: NaiveDate,
        days: u32,
    ) -> Result<Vec<PhaseResult>, CycleError> {
        Self::require_last_start(user_id, stats)?;

        let mut results = Vec::with_capacity(days as usize);
        for offset in 0..i64::from(days) {
            let Some(target) = add_days(start, offset) else {
                break;
            };
            results.push(Self::predict(user_id, stats, target)?);
        }

        Ok(results)
    }

    /// Days until the predicted next start as seen from `reference`
    pub fn outlook(
        user_id: &str,
        stats: &CycleStatsSummary,
        reference: NaiveDate,
    ) -> Result<CycleOutlook, CycleError> {
        let last_start = Self::require_last_start(user_id, stats)?;
        let predicted_next_start = stats.predicted_next_start.ok_or_else(|| {
            CycleError::InvalidRange {
                reason: format!("no predicted start after {}", last_start),
            }
        })?;

        let days_until_next = days_between(reference, predicted_next_start);
        let in_pms_window =
            (-PMS_WINDOW_AFTER..=PMS_WINDOW_BEFORE).contains(&days_until_next);

        Ok(CycleOutlook {
            reference_date: reference,
            last_start,
            predicted_next_start,
            days_until_next,
            in_pms_window,
        })
    }

    fn require_last_start(
        user_id: &str,
        stats: &CycleStatsSummary,
    ) -> Result<NaiveDate, CycleError> {
        stats.last_start.ok_or_else(|| CycleError::NoData {
            user_id: user_id.to_string(),
        })
    }
}
