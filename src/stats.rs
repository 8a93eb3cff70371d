use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::dates::{add_days, days_between};
use crate::models::{
    whole_days, Confidence, CycleEvent, CycleStatsSummary, DEFAULT_CYCLE_LENGTH,
    DEFAULT_EVENT_DURATION,
};

/// Plausible gap between consecutive starts; anything else is mis-logged
pub const CYCLE_LENGTH_RANGE: RangeInclusive<i64> = 20..=40;

/// Plausible inclusive period duration
pub const EVENT_DURATION_RANGE: RangeInclusive<i64> = 2..=10;

/// Core cycle statistics engine
pub struct CycleStatsCalculator;

impl CycleStatsCalculator {
    /// Compute statistics from a full event history.
    ///
    /// Never fails: records whose start date does not parse are dropped,
    /// duplicate start dates count once, and every average falls back to its
    /// default when no sample survives the outlier filter.
    pub fn calculate(events: &[CycleEvent]) -> CycleStatsSummary {
        if events.is_empty() {
            return CycleStatsSummary::default();
        }

        let periods = Self::collect_periods(events);

        if periods.len() < 2 {
            let last_start = periods.keys().next_back().copied();
            return CycleStatsSummary {
                last_start,
                predicted_next_start: last_start
                    .and_then(|start| add_days(start, i64::from(DEFAULT_CYCLE_LENGTH))),
                confidence: Confidence::Low,
                ..CycleStatsSummary::default()
            };
        }

        let starts: Vec<NaiveDate> = periods.keys().copied().collect();
        let gaps = Self::cycle_gaps(&starts);
        let durations = Self::event_durations(&periods);

        let avg_cycle_length =
            Self::mean(&gaps).unwrap_or_else(|| Decimal::from(DEFAULT_CYCLE_LENGTH));
        let avg_event_duration =
            Self::mean(&durations).unwrap_or_else(|| Decimal::from(DEFAULT_EVENT_DURATION));

        let last_start = starts.last().copied();
        let predicted_next_start = last_start
            .and_then(|start| add_days(start, i64::from(whole_days(avg_cycle_length))));

        CycleStatsSummary {
            avg_cycle_length,
            avg_event_duration,
            last_start,
            predicted_next_start,
            confidence: Confidence::from_cycle_samples(gaps.len()),
            cycle_samples: gaps.len(),
            duration_samples: durations.len(),
        }
    }

    /// Parse, sort, and de-duplicate events into start -> optional end
    fn collect_periods(events: &[CycleEvent]) -> BTreeMap<NaiveDate, Option<NaiveDate>> {
        let mut periods: BTreeMap<NaiveDate, Option<NaiveDate>> = BTreeMap::new();

        for event in events {
            let Some(start) = event.parsed_start() else {
                debug!(
                    user_id = %event.user_id,
                    start_date = %event.start_date,
                    "Skipping period with unparseable start date"
                );
                continue;
            };

            let end = event.parsed_end();
            periods
                .entry(start)
                .and_modify(|existing| {
                    if existing.is_none() {
                        *existing = end;
                    }
                })
                .or_insert(end);
        }

        periods
    }

    /// Gaps between consecutive sorted starts that pass the outlier filter
    pub fn cycle_gaps(sorted_starts: &[NaiveDate]) -> Vec<i64> {
        sorted_starts
            .windows(2)
            .map(|pair| days_between(pair[0], pair[1]))
            .filter(|gap| CYCLE_LENGTH_RANGE.contains(gap))
            .collect()
    }

    /// Inclusive durations of completed periods that pass the outlier filter
    fn event_durations(periods: &BTreeMap<NaiveDate, Option<NaiveDate>>) -> Vec<i64> {
        periods
            .iter()
            .filter_map(|(start, end)| end.map(|end| days_between(*start, end) + 1))
            .filter(|length| EVENT_DURATION_RANGE.contains(length))
            .collect()
    }

    fn mean(samples: &[i64]) -> Option<Decimal> {
        if samples.is_empty() {
            return None;
        }
        let total: i64 = samples.iter().sum();
        Some(Decimal::from(total) / Decimal::from(samples.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(start: &str) -> CycleEvent {
        CycleEvent {
            user_id: "test_user".to_string(),
            start_date: start.to_string(),
            end_date: None,
            notes: None,
        }
    }

    fn event_with_end(start: &str, end: &str) -> CycleEvent {
        CycleEvent {
            end_date: Some(end.to_string()),
            ..event(start)
        }
    }

    #[test]
    fn test_empty_history_defaults() {
        let stats = CycleStatsCalculator::calculate(&[]);
        assert_eq!(stats.avg_cycle_length, dec!(28));
        assert_eq!(stats.avg_event_duration, dec!(5));
        assert_eq!(stats.last_start, None);
        assert_eq!(stats.predicted_next_start, None);
        assert_eq!(stats.confidence, Confidence::None);
    }

    #[test]
    fn test_single_event_predicts_default_cycle() {
        let stats = CycleStatsCalculator::calculate(&[event("2024-03-01")]);
        assert_eq!(stats.last_start, Some(date(2024, 3, 1)));
        assert_eq!(stats.predicted_next_start, Some(date(2024, 3, 29)));
        assert_eq!(stats.confidence, Confidence::Low);
        assert_eq!(stats.avg_cycle_length, dec!(28));
    }

    #[test]
    fn test_only_unparseable_events() {
        let stats = CycleStatsCalculator::calculate(&[event("not-a-date"), event("2024-13-01")]);
        assert_eq!(stats.last_start, None);
        assert_eq!(stats.predicted_next_start, None);
        assert_eq!(stats.confidence, Confidence::Low);
    }

    #[test]
    fn test_two_gaps_are_medium_confidence() {
        let events = vec![event("2024-01-01"), event("2024-01-29"), event("2024-02-26")];
        let stats = CycleStatsCalculator::calculate(&events);

        assert_eq!(stats.avg_cycle_length, dec!(28));
        assert_eq!(stats.rounded_cycle_length().to_string(), "28.0");
        assert_eq!(stats.confidence, Confidence::Medium);
        assert_eq!(stats.cycle_samples, 2);
        assert_eq!(stats.last_start, Some(date(2024, 2, 26)));
        assert_eq!(stats.predicted_next_start, Some(date(2024, 3, 25)));
    }

    #[test]
    fn test_three_gaps_are_high_confidence() {
        let events = vec![
            event("2024-04-22"),
            event("2024-01-01"),
            event("2024-02-26"),
            event("2024-01-30"),
        ];
        let stats = CycleStatsCalculator::calculate(&events);

        // gaps 29, 27, 56 -> 56 filtered; unordered input is sorted first
        assert_eq!(stats.cycle_samples, 2);
        assert_eq!(stats.avg_cycle_length, dec!(28));
        assert_eq!(stats.confidence, Confidence::Medium);

        let mut more = events.clone();
        more.push(event("2024-03-25"));
        let stats = CycleStatsCalculator::calculate(&more);
        assert_eq!(stats.cycle_samples, 4);
        assert_eq!(stats.confidence, Confidence::High);
    }

    #[test]
    fn test_outlier_gap_falls_back_to_default() {
        let events = vec![event("2024-01-01"), event("2024-03-31")];
        let stats = CycleStatsCalculator::calculate(&events);

        assert_eq!(stats.avg_cycle_length, dec!(28));
        assert_eq!(stats.cycle_samples, 0);
        assert_eq!(stats.confidence, Confidence::Low);
        assert_eq!(stats.predicted_next_start, Some(date(2024, 4, 28)));
    }

    #[test]
    fn test_gap_filter_bounds_inclusive() {
        let starts = vec![date(2024, 1, 1), date(2024, 1, 21), date(2024, 3, 1), date(2024, 3, 20)];
        // 20 kept, 40 kept, 19 dropped
        assert_eq!(CycleStatsCalculator::cycle_gaps(&starts), vec![20, 40]);
    }

    #[test]
    fn test_unrounded_average_drives_prediction() {
        // gaps 28 and 29 -> 28.5 -> predicted shift of 29 days
        let events = vec![event("2024-01-01"), event("2024-01-29"), event("2024-02-27")];
        let stats = CycleStatsCalculator::calculate(&events);

        assert_eq!(stats.avg_cycle_length, dec!(28.5));
        assert_eq!(stats.predicted_next_start, Some(date(2024, 3, 27)));
    }

    #[test]
    fn test_event_duration_filtering() {
        let events = vec![
            event_with_end("2024-01-01", "2024-01-05"), // 5
            event_with_end("2024-01-29", "2024-02-01"), // 4
            event_with_end("2024-02-26", "2024-03-12"), // 16, dropped
            event_with_end("2024-03-25", "2024-03-25"), // 1, dropped
            event_with_end("2024-04-22", "garbage"),
        ];
        let stats = CycleStatsCalculator::calculate(&events);

        assert_eq!(stats.duration_samples, 2);
        assert_eq!(stats.avg_event_duration, dec!(4.5));
        assert_eq!(stats.period_length_days(), 5);
    }

    #[test]
    fn test_duration_defaults_without_end_dates() {
        let events = vec![event("2024-01-01"), event("2024-01-29")];
        let stats = CycleStatsCalculator::calculate(&events);
        assert_eq!(stats.avg_event_duration, dec!(5));
        assert_eq!(stats.duration_samples, 0);
    }

    #[test]
    fn test_duplicate_starts_count_once() {
        let events = vec![
            event("2024-01-01"),
            event_with_end("2024-01-01", "2024-01-06"),
            event("2024-01-29"),
            event("2024-01-29"),
        ];
        let stats = CycleStatsCalculator::calculate(&events);

        assert_eq!(stats.cycle_samples, 1);
        assert_eq!(stats.avg_cycle_length, dec!(28));
        assert_eq!(stats.avg_event_duration, dec!(6));
        assert_eq!(stats.confidence, Confidence::Medium);
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let events = vec![
            event("2024-01-01"),
            event("01/29/2024"),
            event("2024-01-29"),
        ];
        let stats = CycleStatsCalculator::calculate(&events);
        assert_eq!(stats.cycle_samples, 1);
        assert_eq!(stats.last_start, Some(date(2024, 1, 29)));
    }

    #[test]
    fn test_calculation_is_deterministic() {
        let events = vec![event("2024-01-01"), event("2024-01-30"), event("2024-02-27")];
        assert_eq!(
            CycleStatsCalculator::calculate(&events),
            CycleStatsCalculator::calculate(&events)
        );
    }
}
