use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::dates::{format_date, parse_date};

/// One logged period as the store holds it.
///
/// Dates stay as stored text: the store may contain values that do not
/// parse, and the statistics calculator decides what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEvent {
    /// Owner scope of the record
    pub user_id: String,

    /// Start date (`YYYY-MM-DD`), unique per user
    pub start_date: String,

    /// End date, absent while the period is ongoing or unrecorded
    pub end_date: Option<String>,

    /// Free text, ignored by the engine
    pub notes: Option<String>,
}

impl CycleEvent {
    pub fn new(user_id: impl Into<String>, start: NaiveDate) -> Self {
        CycleEvent {
            user_id: user_id.into(),
            start_date: format_date(start),
            end_date: None,
            notes: None,
        }
    }

    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end_date = Some(format_date(end));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn parsed_start(&self) -> Option<NaiveDate> {
        parse_date(&self.start_date)
    }

    pub fn parsed_end(&self) -> Option<NaiveDate> {
        self.end_date.as_deref().and_then(parse_date)
    }
}

/// How much filtered history backs a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier for a history with at least two valid starts, by surviving gap count
    pub fn from_cycle_samples(samples: usize) -> Self {
        match samples {
            0 => Confidence::Low,
            1 | 2 => Confidence::Medium,
            _ => Confidence::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Confidence::None),
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(format!("Invalid confidence: {}", s)),
        }
    }
}

/// Default cycle length in days when history cannot provide one
pub const DEFAULT_CYCLE_LENGTH: u32 = 28;

/// Default period duration in days when history cannot provide one
pub const DEFAULT_EVENT_DURATION: u32 = 5;

/// Aggregate statistics derived from a user's full period history.
///
/// Averages are held unrounded so that day arithmetic does not compound
/// rounding error; they serialize rounded to one decimal place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStatsSummary {
    /// Mean days between consecutive starts
    #[serde(serialize_with = "serialize_one_decimal")]
    pub avg_cycle_length: Decimal,

    /// Mean inclusive period duration in days
    #[serde(serialize_with = "serialize_one_decimal")]
    pub avg_event_duration: Decimal,

    /// Most recent valid start date
    pub last_start: Option<NaiveDate>,

    /// `last_start` shifted by the rounded average cycle length
    pub predicted_next_start: Option<NaiveDate>,

    pub confidence: Confidence,

    /// Gaps that survived the outlier filter
    pub cycle_samples: usize,

    /// Durations that survived the outlier filter
    pub duration_samples: usize,
}

impl Default for CycleStatsSummary {
    fn default() -> Self {
        CycleStatsSummary {
            avg_cycle_length: Decimal::from(DEFAULT_CYCLE_LENGTH),
            avg_event_duration: Decimal::from(DEFAULT_EVENT_DURATION),
            last_start: None,
            predicted_next_start: None,
            confidence: Confidence::None,
            cycle_samples: 0,
            duration_samples: 0,
        }
    }
}

impl CycleStatsSummary {
    /// Average cycle length as surfaced to callers
    pub fn rounded_cycle_length(&self) -> Decimal {
        one_decimal(self.avg_cycle_length)
    }

    /// Average period duration as surfaced to callers
    pub fn rounded_event_duration(&self) -> Decimal {
        one_decimal(self.avg_event_duration)
    }

    /// Cycle length in whole days, never below one
    pub fn cycle_length_days(&self) -> u32 {
        whole_days(self.avg_cycle_length).max(1)
    }

    /// Period duration in whole days
    pub fn period_length_days(&self) -> u32 {
        whole_days(self.avg_event_duration)
    }

    pub fn has_history(&self) -> bool {
        self.last_start.is_some()
    }
}

/// Round half away from zero to a whole number of days
pub fn whole_days(value: Decimal) -> u32 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0)
}

fn one_decimal(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(1);
    rounded
}

fn serialize_one_decimal<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(one_decimal(*value).to_f64().unwrap_or(0.0))
}

/// Named segment of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Menstruation,
    Follicular,
    Ovulation,
    Luteal,
    #[serde(rename = "PMS Week")]
    PmsWeek,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Menstruation => "Menstruation",
            Phase::Follicular => "Follicular",
            Phase::Ovulation => "Ovulation",
            Phase::Luteal => "Luteal",
            Phase::PmsWeek => "PMS Week",
        }
    }

    /// Display marker shown next to the phase name
    pub fn marker(&self) -> &'static str {
        match self {
            Phase::Menstruation => "🔴",
            Phase::Follicular => "🟡",
            Phase::Ovulation => "🟠",
            Phase::Luteal => "🟣",
            Phase::PmsWeek => "🌙",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::Menstruation => "Period days",
            Phase::Follicular => "Energy rising after the period",
            Phase::Ovulation => "Fertile window around mid-cycle",
            Phase::Luteal => "Post-ovulation, energy tapering",
            Phase::PmsWeek => "Final days before the next period",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Phase classification of a single date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub target_date: NaiveDate,
    pub phase: Phase,

    /// 1-based day within the current cycle
    pub day_in_cycle: u32,

    /// Whole-day cycle length used for the classification
    pub cycle_length: u32,

    pub stats: CycleStatsSummary,
}

/// Distance to the predicted next start from a reference date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOutlook {
    pub reference_date: NaiveDate,
    pub last_start: NaiveDate,
    pub predicted_next_start: NaiveDate,

    /// Negative once the predicted date has passed
    pub days_until_next: i64,

    /// Within the week leading up to (or two days past) the predicted start
    pub in_pms_window: bool,
}

/// Statistics as last persisted to the cache table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStats {
    pub user_id: String,
    pub summary: CycleStatsSummary,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(Confidence::from_cycle_samples(0), Confidence::Low);
        assert_eq!(Confidence::from_cycle_samples(1), Confidence::Medium);
        assert_eq!(Confidence::from_cycle_samples(2), Confidence::Medium);
        assert_eq!(Confidence::from_cycle_samples(3), Confidence::High);
        assert_eq!(Confidence::from_cycle_samples(12), Confidence::High);
        assert_eq!("HIGH".parse::<Confidence>().unwrap(), Confidence::High);
    }

    #[test]
    fn test_summary_rounding() {
        let summary = CycleStatsSummary {
            avg_cycle_length: dec!(85) / dec!(3),
            avg_event_duration: dec!(4.25),
            ..CycleStatsSummary::default()
        };

        assert_eq!(summary.rounded_cycle_length().to_string(), "28.3");
        assert_eq!(summary.rounded_event_duration().to_string(), "4.3");
        assert_eq!(summary.cycle_length_days(), 28);
        assert_eq!(summary.period_length_days(), 4);
    }

    #[test]
    fn test_whole_days_rounds_half_up() {
        assert_eq!(whole_days(dec!(28.5)), 29);
        assert_eq!(whole_days(dec!(28.49)), 28);
        assert_eq!(whole_days(dec!(4.5)), 5);
    }

    #[test]
    fn test_default_summary_serializes_with_one_decimal() {
        let json = serde_json::to_value(CycleStatsSummary::default()).unwrap();
        assert_eq!(json["avg_cycle_length"], serde_json::json!(28.0));
        assert_eq!(json["avg_event_duration"], serde_json::json!(5.0));
        assert_eq!(json["confidence"], "none");
        assert!(json["last_start"].is_null());
    }

    #[test]
    fn test_phase_serializes_display_name() {
        let json = serde_json::to_string(&Phase::PmsWeek).unwrap();
        assert_eq!(json, "\"PMS Week\"");
        assert_eq!(Phase::Ovulation.to_string(), "Ovulation");
    }

    #[test]
    fn test_event_parsing() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let event = CycleEvent::new("alice", start)
            .with_end(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
            .with_notes("cramps");
        assert_eq!(event.start_date, "2024-03-01");
        assert_eq!(event.parsed_start(), Some(start));
        assert!(event.parsed_end().is_some());

        let broken = CycleEvent {
            end_date: Some("soon".to_string()),
            ..event
        };
        assert_eq!(broken.parsed_end(), None);
    }
}
