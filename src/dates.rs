//! Calendar primitives shared by the statistics and phase calculations.
//!
//! Everything in the engine reduces to two numeric operations: a
//! calendar-correct day difference/addition and a floor-modulo that stays
//! non-negative for dates preceding the reference start.

use chrono::{Days, Local, NaiveDate};

use crate::error::CycleError;

/// Canonical storage and display format for calendar dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a stored `YYYY-MM-DD` value, returning `None` for anything malformed
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Parse a caller-supplied date, rejecting malformed input with an error
pub fn parse_user_date(raw: &str) -> Result<NaiveDate, CycleError> {
    parse_date(raw).ok_or_else(|| CycleError::InvalidDate {
        value: raw.to_string(),
    })
}

/// Format a date the way the log store persists it
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Today in the machine's local timezone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Signed number of days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// Shift a date by a signed number of days; `None` past chrono's date range
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    let magnitude = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    }
}

/// Floor-modulo: the result lies in `[0, modulus)` even for negative values.
///
/// `modulus` must be positive.
pub fn floor_mod(value: i64, modulus: i64) -> i64 {
    debug_assert!(modulus > 0, "floor_mod requires a positive modulus");
    value.rem_euclid(modulus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-02-29"), Some(date(2024, 2, 29)));
        assert_eq!(parse_date(" 2024-03-01 "), Some(date(2024, 3, 1)));
        assert_eq!(parse_date("2023-02-29"), None);
        assert_eq!(parse_date("03/01/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_user_date_rejects_garbage() {
        let err = parse_user_date("next tuesday").unwrap_err();
        assert!(matches!(err, CycleError::InvalidDate { .. }));
    }

    #[test]
    fn test_days_between_crosses_leap_day() {
        assert_eq!(days_between(date(2024, 2, 28), date(2024, 3, 1)), 2);
        assert_eq!(days_between(date(2023, 2, 28), date(2023, 3, 1)), 1);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 2, 28)), -2);
        assert_eq!(days_between(date(2023, 12, 20), date(2024, 1, 17)), 28);
    }

    #[test]
    fn test_add_days() {
        assert_eq!(add_days(date(2024, 2, 26), 28), Some(date(2024, 3, 25)));
        assert_eq!(add_days(date(2024, 1, 3), -5), Some(date(2023, 12, 29)));
        assert_eq!(add_days(date(2024, 1, 3), 0), Some(date(2024, 1, 3)));
        assert_eq!(add_days(NaiveDate::MAX, 1), None);
    }

    #[test]
    fn test_floor_mod_negative_dividend() {
        assert_eq!(floor_mod(-2, 28), 26);
        assert_eq!(floor_mod(-28, 28), 0);
        assert_eq!(floor_mod(-29, 28), 27);
        assert_eq!(floor_mod(30, 28), 2);
        assert_eq!(floor_mod(0, 28), 0);
    }

    proptest! {
        #[test]
        fn test_floor_mod_range(value in -100_000i64..100_000i64, modulus in 1i64..60i64) {
            let result = floor_mod(value, modulus);
            prop_assert!(result >= 0);
            prop_assert!(result < modulus);
            prop_assert_eq!((value - result) % modulus, 0);
        }

        #[test]
        fn test_add_days_inverts_days_between(offset in -5_000i64..5_000i64) {
            let base = date(2024, 1, 1);
            let shifted = add_days(base, offset).unwrap();
            prop_assert_eq!(days_between(base, shifted), offset);
        }
    }
}
