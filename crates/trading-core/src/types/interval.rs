//! Bar interval definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interval of the bars an engine trades on.
///
/// Names follow the exchange candle API (`minute1`, ..., `day`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// 1 minute bars
    Minute1,
    /// 3 minute bars
    Minute3,
    /// 5 minute bars
    Minute5,
    /// 10 minute bars
    Minute10,
    /// 15 minute bars
    Minute15,
    /// 30 minute bars
    Minute30,
    /// 60 minute bars
    #[default]
    Minute60,
    /// Daily bars
    Day,
}

impl Interval {
    /// Length of one bar in minutes.
    pub fn as_minutes(&self) -> u64 {
        match self {
            Interval::Minute1 => 1,
            Interval::Minute3 => 3,
            Interval::Minute5 => 5,
            Interval::Minute10 => 10,
            Interval::Minute15 => 15,
            Interval::Minute30 => 30,
            Interval::Minute60 => 60,
            Interval::Day => 1440,
        }
    }

    /// Length of one bar in seconds.
    pub fn as_secs(&self) -> u64 {
        self.as_minutes() * 60
    }

    /// Length of one bar in milliseconds.
    pub fn as_millis(&self) -> i64 {
        (self.as_secs() * 1000) as i64
    }

    /// Get all supported intervals.
    pub fn all() -> &'static [Interval] {
        &[
            Interval::Minute1,
            Interval::Minute3,
            Interval::Minute5,
            Interval::Minute10,
            Interval::Minute15,
            Interval::Minute30,
            Interval::Minute60,
            Interval::Day,
        ]
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interval::Minute1 => "minute1",
            Interval::Minute3 => "minute3",
            Interval::Minute5 => "minute5",
            Interval::Minute10 => "minute10",
            Interval::Minute15 => "minute15",
            Interval::Minute30 => "minute30",
            Interval::Minute60 => "minute60",
            Interval::Day => "day",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minute1" | "1m" => Ok(Interval::Minute1),
            "minute3" | "3m" => Ok(Interval::Minute3),
            "minute5" | "5m" => Ok(Interval::Minute5),
            "minute10" | "10m" => Ok(Interval::Minute10),
            "minute15" | "15m" => Ok(Interval::Minute15),
            "minute30" | "30m" => Ok(Interval::Minute30),
            "minute60" | "60m" | "1h" => Ok(Interval::Minute60),
            "day" | "1d" | "daily" => Ok(Interval::Day),
            _ => Err(format!("Invalid interval: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_duration() {
        assert_eq!(Interval::Minute1.as_secs(), 60);
        assert_eq!(Interval::Minute10.as_minutes(), 10);
        assert_eq!(Interval::Day.as_minutes(), 1440);
        assert_eq!(Interval::Minute5.as_millis(), 300_000);
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::from_str("minute3").unwrap(), Interval::Minute3);
        assert_eq!(Interval::from_str("1h").unwrap(), Interval::Minute60);
        assert_eq!(Interval::from_str("DAY").unwrap(), Interval::Day);
        assert!(Interval::from_str("minute7").is_err());
    }

    #[test]
    fn test_interval_serde_names() {
        let json = serde_json::to_string(&Interval::Minute15).unwrap();
        assert_eq!(json, "\"minute15\"");
        let parsed: Interval = serde_json::from_str("\"day\"").unwrap();
        assert_eq!(parsed, Interval::Day);
        assert_eq!(Interval::Minute30.to_string(), "minute30");
    }
}
