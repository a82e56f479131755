//! Billing period: the calendar month an invoice is generated for.

use core::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use casabill_core::{DomainError, DomainResult};

/// A calendar month, e.g. `2024-01`.
///
/// The year range is bounded so date construction below cannot fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "month {month} out of range 1..=12"
            )));
        }
        if !(1970..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "year {year} out of range 1970..=9999"
            )));
        }
        Ok(Self { year, month })
    }

    /// The period a given date falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month; this is the invoice date for generated rent
    /// invoices.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .map(|first_of_next| first_of_next - Duration::days(1))
            .unwrap_or(self.first_day())
    }

    /// Due date for a requested day-of-month, clamped into the month:
    /// `due_day` past the month's length lands on the last valid day, and
    /// zero lands on the first.
    pub fn due_date(&self, due_day: u32) -> NaiveDate {
        let day = due_day.clamp(1, self.last_day().day());
        NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap_or(self.first_day())
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| DomainError::validation(format!("malformed period '{s}'")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| DomainError::validation(format!("malformed period year '{s}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| DomainError::validation(format!("malformed period month '{s}'")))?;
        Self::new(year, month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let period: BillingPeriod = "2024-01".parse().unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 1);
        assert_eq!(period.to_string(), "2024-01");

        assert!("2024-13".parse::<BillingPeriod>().is_err());
        assert!("2024".parse::<BillingPeriod>().is_err());
        assert!("24-xx".parse::<BillingPeriod>().is_err());
    }

    #[test]
    fn first_and_last_day() {
        let jan: BillingPeriod = "2024-01".parse().unwrap();
        assert_eq!(jan.first_day(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(jan.last_day(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());

        let dec: BillingPeriod = "2024-12".parse().unwrap();
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn due_day_clamps_to_month_length() {
        let feb_leap: BillingPeriod = "2024-02".parse().unwrap();
        assert_eq!(
            feb_leap.due_date(31),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );

        let feb: BillingPeriod = "2023-02".parse().unwrap();
        assert_eq!(
            feb.due_date(31),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );

        let apr: BillingPeriod = "2024-04".parse().unwrap();
        assert_eq!(
            apr.due_date(31),
            NaiveDate::from_ymd_opt(2024, 4, 30).unwrap()
        );
        assert_eq!(
            apr.due_date(5),
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap()
        );
        assert_eq!(
            apr.due_date(0),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
        );
    }

    #[test]
    fn from_date_truncates_to_month() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 19).unwrap();
        let period = BillingPeriod::from_date(date);
        assert_eq!(period.to_string(), "2024-07");
    }
}
