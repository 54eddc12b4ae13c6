//! Lookback periods for sector performance.

use market_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lookback window selectable by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "15d")]
    FifteenDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Period {
    pub fn all() -> [Period; 7] {
        [
            Period::OneDay,
            Period::FiveDays,
            Period::FifteenDays,
            Period::OneMonth,
            Period::ThreeMonths,
            Period::SixMonths,
            Period::OneYear,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::FifteenDays => "15d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
        }
    }

    /// Calendar days of history to fetch. Covers the lookback plus weekends
    /// and holidays.
    pub fn fetch_window_days(&self) -> u32 {
        match self {
            Period::OneDay => 7,
            Period::FiveDays => 14,
            Period::FifteenDays => 30,
            Period::OneMonth => 45,
            Period::ThreeMonths => 120,
            Period::SixMonths => 220,
            Period::OneYear => 400,
        }
    }

    /// Number of trading days between the baseline and the latest close
    pub fn lookback(&self) -> usize {
        match self {
            Period::OneDay => 1,
            Period::FiveDays => 5,
            Period::FifteenDays => 15,
            Period::OneMonth => 21,
            Period::ThreeMonths => 63,
            Period::SixMonths => 126,
            Period::OneYear => 252,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Period {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Period::all()
            .into_iter()
            .find(|p| p.key() == key)
            .ok_or_else(|| ConfigError::UnknownPeriod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_keys() {
        for period in Period::all() {
            assert_eq!(period.key().parse::<Period>().unwrap(), period);
        }
        assert_eq!(" 1MO ".parse::<Period>().unwrap(), Period::OneMonth);
    }

    #[test]
    fn test_unknown_key_fails_fast() {
        assert_eq!(
            "2w".parse::<Period>(),
            Err(ConfigError::UnknownPeriod("2w".to_string()))
        );
    }

    #[test]
    fn test_window_covers_lookback() {
        for period in Period::all() {
            // ~5 trading days per 7 calendar days
            let trading_days = period.fetch_window_days() as usize * 5 / 7;
            assert!(trading_days >= period.lookback(), "{} window too short", period);
        }
    }

    #[test]
    fn test_serde_uses_keys() {
        assert_eq!(serde_json::to_string(&Period::ThreeMonths).unwrap(), "\"3mo\"");
    }
}
