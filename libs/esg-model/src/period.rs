//! Reporting period keys
//!
//! Periods are opaque string keys in one of three shapes: `YYYY`,
//! `YYYY-MM`, or `YYYY-Qn`. The same key filters raw-table rows and
//! selects the comparison period for year-over-year formulas.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Period parsing errors
#[derive(Debug, Error)]
pub enum PeriodError {
    #[error("Invalid period '{0}': expected YYYY, YYYY-MM or YYYY-Qn")]
    Invalid(String),
}

/// A validated reporting period key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(String);

impl Period {
    /// Parse and validate a period string
    pub fn parse(input: &str) -> Result<Self, PeriodError> {
        let (year, suffix) = match input.split_once('-') {
            Some((y, s)) => (y, Some(s)),
            None => (input, None),
        };

        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PeriodError::Invalid(input.to_string()));
        }

        match suffix {
            None => {},
            Some(s) if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) => {
                let month: u32 = s.parse().map_err(|_| PeriodError::Invalid(input.to_string()))?;
                if !(1..=12).contains(&month) {
                    return Err(PeriodError::Invalid(input.to_string()));
                }
            },
            Some(s) => {
                let quarter = s
                    .strip_prefix('Q')
                    .and_then(|q| q.parse::<u32>().ok())
                    .filter(|q| (1..=4).contains(q));
                if quarter.is_none() {
                    return Err(PeriodError::Invalid(input.to_string()));
                }
            },
        }

        Ok(Self(input.to_string()))
    }

    /// The raw period key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The year component
    pub fn year(&self) -> i32 {
        self.0[..4].parse().unwrap_or(0)
    }

    /// The equivalent period one year earlier
    ///
    /// Decrements the year and preserves the month/quarter component,
    /// so `2024-Q2` becomes `2023-Q2`.
    pub fn previous(&self) -> Period {
        let year = self.year() - 1;
        match self.0.split_once('-') {
            Some((_, suffix)) => Period(format!("{:04}-{}", year, suffix)),
            None => Period(format!("{:04}", year)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_year() {
        let p = Period::parse("2024").unwrap();
        assert_eq!(p.as_str(), "2024");
        assert_eq!(p.year(), 2024);
    }

    #[test]
    fn test_parse_month() {
        assert!(Period::parse("2024-01").is_ok());
        assert!(Period::parse("2024-12").is_ok());
        assert!(Period::parse("2024-00").is_err());
        assert!(Period::parse("2024-13").is_err());
    }

    #[test]
    fn test_parse_quarter() {
        assert!(Period::parse("2024-Q1").is_ok());
        assert!(Period::parse("2024-Q4").is_ok());
        assert!(Period::parse("2024-Q5").is_err());
        assert!(Period::parse("2024-Qx").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Period::parse("").is_err());
        assert!(Period::parse("24").is_err());
        assert!(Period::parse("20x4").is_err());
        assert!(Period::parse("2024-").is_err());
    }

    #[test]
    fn test_previous_year() {
        let p = Period::parse("2024").unwrap();
        assert_eq!(p.previous().as_str(), "2023");
    }

    #[test]
    fn test_previous_preserves_suffix() {
        assert_eq!(Period::parse("2024-06").unwrap().previous().as_str(), "2023-06");
        assert_eq!(Period::parse("2024-Q2").unwrap().previous().as_str(), "2023-Q2");
    }

    #[test]
    fn test_serde_transparent() {
        let p = Period::parse("2024-Q1").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"2024-Q1\"");
    }
}
