//! Named date ranges for the filter bar.

use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown date range '{name}'. Available: {available}")]
pub struct UnknownRange {
    pub name: String,
    pub available: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatePreset {
    Today,
    Yesterday,
    WeekToDate,
    LastWeek,
    #[default]
    MonthToDate,
    LastMonth,
    Last7Days,
    Last30Days,
    QuarterToDate,
    YearToDate,
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// `YYYY-MM-DD` bounds as the backend compares them.
    pub fn bounds(&self) -> (String, String) {
        (
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        )
    }
}

impl DatePreset {
    pub const ALL: [DatePreset; 10] = [
        DatePreset::Today,
        DatePreset::Yesterday,
        DatePreset::WeekToDate,
        DatePreset::LastWeek,
        DatePreset::MonthToDate,
        DatePreset::LastMonth,
        DatePreset::Last7Days,
        DatePreset::Last30Days,
        DatePreset::QuarterToDate,
        DatePreset::YearToDate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatePreset::Today => "today",
            DatePreset::Yesterday => "yesterday",
            DatePreset::WeekToDate => "wtd",
            DatePreset::LastWeek => "last_week",
            DatePreset::MonthToDate => "mtd",
            DatePreset::LastMonth => "last_month",
            DatePreset::Last7Days => "last_7",
            DatePreset::Last30Days => "last_30",
            DatePreset::QuarterToDate => "qtd",
            DatePreset::YearToDate => "ytd",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DatePreset::Today => "Today",
            DatePreset::Yesterday => "Yesterday",
            DatePreset::WeekToDate => "This Week",
            DatePreset::LastWeek => "Last Week",
            DatePreset::MonthToDate => "Month to Date",
            DatePreset::LastMonth => "Last Month",
            DatePreset::Last7Days => "Last 7 Days",
            DatePreset::Last30Days => "Last 30 Days",
            DatePreset::QuarterToDate => "Quarter to Date",
            DatePreset::YearToDate => "Year to Date",
        }
    }

    /// The next preset in [`DatePreset::ALL`], wrapping around.
    pub fn next(&self) -> DatePreset {
        let idx = Self::ALL.iter().position(|p| p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        // Weeks start on Sunday.
        let week_start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
        let month_start = first_of_month(today.year(), today.month());

        let (start, end) = match self {
            DatePreset::Today => (today, today),
            DatePreset::Yesterday => {
                let d = today - Duration::days(1);
                (d, d)
            }
            DatePreset::WeekToDate => (week_start, today),
            DatePreset::LastWeek => (week_start - Duration::days(7), week_start - Duration::days(1)),
            DatePreset::MonthToDate => (month_start, today),
            DatePreset::LastMonth => {
                let end = month_start - Duration::days(1);
                (first_of_month(end.year(), end.month()), end)
            }
            DatePreset::Last7Days => (today - Duration::days(6), today),
            DatePreset::Last30Days => (today - Duration::days(29), today),
            DatePreset::QuarterToDate => {
                let quarter_month = (today.month0() / 3) * 3 + 1;
                (first_of_month(today.year(), quarter_month), today)
            }
            DatePreset::YearToDate => (first_of_month(today.year(), 1), today),
        };
        DateRange { start, end }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Day 1 exists in every month of every year chrono can represent.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

impl fmt::Display for DatePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatePreset {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(DatePreset::Today),
            "yesterday" => Ok(DatePreset::Yesterday),
            "wtd" | "this_week" => Ok(DatePreset::WeekToDate),
            "last_week" => Ok(DatePreset::LastWeek),
            "mtd" | "this_month" => Ok(DatePreset::MonthToDate),
            "last_month" => Ok(DatePreset::LastMonth),
            "last_7" => Ok(DatePreset::Last7Days),
            "last_30" => Ok(DatePreset::Last30Days),
            "qtd" => Ok(DatePreset::QuarterToDate),
            "ytd" => Ok(DatePreset::YearToDate),
            _ => Err(UnknownRange {
                name: s.to_string(),
                available: Self::ALL.iter().map(|p| p.name()).collect::<Vec<_>>().join(", "),
            }),
        }
    }
}
