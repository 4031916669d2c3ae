//! Fiscal quarter-end resolution.
//!
//! Shareholder counts are published per quarter end. Given the day the
//! screen runs, pick the three most recent quarter ends whose data has
//! normally been disclosed.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fiscal quarter end (Mar 31, Jun 30, Sep 30, Dec 31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawQuarterEnd")]
pub struct QuarterEnd {
    year: i32,
    quarter: u8,
}

impl QuarterEnd {
    /// Create a quarter end. `quarter` is clamped into 1..=4.
    pub fn new(year: i32, quarter: u8) -> Self {
        Self {
            year,
            quarter: quarter.clamp(1, 4),
        }
    }

    /// Calendar date of the quarter end.
    pub fn date(&self) -> NaiveDate {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MIN)
    }

    /// The quarter end before this one.
    pub fn previous(&self) -> Self {
        if self.quarter == 1 {
            Self::new(self.year - 1, 4)
        } else {
            Self::new(self.year, self.quarter - 1)
        }
    }

    /// `YYYYMMDD` label used by the disclosure sources.
    pub fn label(&self) -> String {
        self.date().format("%Y%m%d").to_string()
    }
}

#[derive(Deserialize)]
struct RawQuarterEnd {
    year: i32,
    quarter: u8,
}

impl TryFrom<RawQuarterEnd> for QuarterEnd {
    type Error = String;

    fn try_from(raw: RawQuarterEnd) -> Result<Self, Self::Error> {
        if (1..=4).contains(&raw.quarter) {
            Ok(Self {
                year: raw.year,
                quarter: raw.quarter,
            })
        } else {
            Err(format!("quarter must be in 1..=4, got {}", raw.quarter))
        }
    }
}

impl fmt::Display for QuarterEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Three most recent disclosed quarter ends, most recent first.
///
/// | Month   | Quarters                         |
/// |---------|----------------------------------|
/// | 1-3     | last Q4, last Q3, last Q2        |
/// | 4-6     | this Q1, last Q4, last Q3        |
/// | 7-9     | this Q2, this Q1, last Q4        |
/// | 10-12   | this Q3, this Q2, this Q1        |
pub fn recent_quarter_ends(reference: NaiveDate) -> [QuarterEnd; 3] {
    let year = reference.year();
    let latest = match reference.month() {
        1..=3 => QuarterEnd::new(year - 1, 4),
        4..=6 => QuarterEnd::new(year, 1),
        7..=9 => QuarterEnd::new(year, 2),
        _ => QuarterEnd::new(year, 3),
    };
    let prior = latest.previous();
    [latest, prior, prior.previous()]
}
