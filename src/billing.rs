use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Fees are always charged from the 1st of the month.
pub const BILLING_CYCLE_START_DAY: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoiningFee {
    pub is_conflict: bool,
    pub remaining_days: u32,
    pub suggested_amount: i64,
    pub explanation: String,
}

/// Suggested first-month charge for a student joining mid-cycle.
///
/// Joining on the cycle start day charges the full monthly fee. Any later
/// day is prorated over the remaining days of that calendar month, join day
/// included, rounded to the nearest whole currency unit.
pub fn calculate_joining_fee(joining_date: NaiveDate, monthly_fee: i64) -> JoiningFee {
    let day = joining_date.day();
    if day == BILLING_CYCLE_START_DAY {
        return JoiningFee {
            is_conflict: false,
            remaining_days: days_in_month(joining_date.year(), joining_date.month()),
            suggested_amount: monthly_fee,
            explanation: "Standard billing cycle: joining on the 1st, full monthly fee applies."
                .to_string(),
        };
    }

    let days_in_month = days_in_month(joining_date.year(), joining_date.month());
    let remaining_days = days_in_month - day + 1;
    let suggested_amount =
        (monthly_fee as f64 / days_in_month as f64 * remaining_days as f64).round() as i64;

    JoiningFee {
        is_conflict: true,
        remaining_days,
        suggested_amount,
        explanation: format!(
            "Pro-rata: joining on the {} leaves {} of {} days in the month.",
            ordinal(day),
            remaining_days,
            days_in_month
        ),
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    // Both dates are always valid for a valid (year, month).
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    match (first, next) {
        (Some(a), Some(b)) => b.signed_duration_since(a).num_days() as u32,
        _ => 30,
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match day % 100 {
        11 | 12 | 13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{}{}", day, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid test date")
    }

    #[test]
    fn first_of_month_is_full_fee() {
        let fee = calculate_joining_fee(d(2026, 1, 1), 3100);
        assert!(!fee.is_conflict);
        assert_eq!(fee.suggested_amount, 3100);
        assert!(fee.explanation.contains("Standard billing cycle"));
    }

    #[test]
    fn mid_month_join_is_prorated() {
        let fee = calculate_joining_fee(d(2026, 1, 15), 3100);
        assert!(fee.is_conflict);
        assert_eq!(fee.remaining_days, 17);
        assert_eq!(fee.suggested_amount, 1700);
        assert!(fee.explanation.contains("Pro-rata"));
        assert!(fee.explanation.contains("15th"));
    }

    #[test]
    fn last_day_of_month_charges_one_day() {
        let fee = calculate_joining_fee(d(2026, 1, 31), 3100);
        assert_eq!(fee.remaining_days, 1);
        assert_eq!(fee.suggested_amount, 100);
    }

    #[test]
    fn february_non_leap() {
        let fee = calculate_joining_fee(d(2026, 2, 14), 2800);
        assert_eq!(fee.remaining_days, 15);
        assert_eq!(fee.suggested_amount, 1500);
    }

    #[test]
    fn february_leap_year() {
        // 2028 is a leap year: 29 days, joining on the 2nd leaves 28.
        let fee = calculate_joining_fee(d(2028, 2, 2), 2900);
        assert_eq!(fee.remaining_days, 28);
        assert_eq!(fee.suggested_amount, 2800);
    }

    #[test]
    fn zero_monthly_fee_suggests_zero() {
        assert_eq!(calculate_joining_fee(d(2026, 1, 1), 0).suggested_amount, 0);
        assert_eq!(calculate_joining_fee(d(2026, 1, 20), 0).suggested_amount, 0);
    }

    #[test]
    fn december_rolls_into_next_year() {
        let fee = calculate_joining_fee(d(2026, 12, 31), 3100);
        assert_eq!(fee.remaining_days, 1);
        assert_eq!(fee.suggested_amount, 100);
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(23), "23rd");
        assert_eq!(ordinal(31), "31st");
    }

    #[test]
    fn deterministic_for_same_input() {
        let a = calculate_joining_fee(d(2026, 6, 10), 2500);
        let b = calculate_joining_fee(d(2026, 6, 10), 2500);
        assert_eq!(a, b);
    }
}
