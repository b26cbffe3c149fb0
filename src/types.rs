// 1.0: primitives shared by every stage of the pipeline.
// symbols, settlement intervals, timestamps, and the guarded division every derived metric goes through.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const HOURS_PER_DAY: Decimal = dec!(24);
pub const DAYS_PER_MONTH: Decimal = dec!(30);
pub const DAYS_PER_YEAR: Decimal = dec!(365);
pub const MS_PER_HOUR: i64 = 3_600_000;

// 1.1: instrument symbol as the exchange spells it ("BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Empty or whitespace-only symbols are rejected.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.2: settlement cadence in hours. always > 0; anything else falls back to 8h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalHours(Decimal);

impl IntervalHours {
    pub const DEFAULT: IntervalHours = IntervalHours(dec!(8));

    #[must_use]
    pub fn new(hours: Decimal) -> Option<Self> {
        if hours > Decimal::ZERO {
            Some(Self(hours))
        } else {
            None
        }
    }

    pub fn or_default(hours: Option<Decimal>) -> Self {
        hours.and_then(Self::new).unwrap_or(Self::DEFAULT)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    // rate quoted per settlement -> rate per hour
    pub fn hourly(&self, per_settlement: Decimal) -> Decimal {
        per_settlement / self.0
    }
}

impl Default for IntervalHours {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for IntervalHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.0)
    }
}

// 1.3: millisecond timestamp (exchange event times and local wall clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_datetime(at: chrono::DateTime<chrono::Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.0)
    }

    /// Hours from `self` to `later`; negative spans clamp to zero.
    pub fn hours_until(&self, later: &Timestamp) -> Decimal {
        let diff_ms = (later.0 - self.0).max(0);
        Decimal::from(diff_ms) / Decimal::from(MS_PER_HOUR)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(at) => write!(f, "{}", at.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// 1.4: every derived metric divides through here. zero or negative denominators give exactly 0.
pub fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator > Decimal::ZERO {
        numerator / denominator
    } else {
        Decimal::ZERO
    }
}

// 1.5: an hourly figure projected onto day / 30-day month / 365-day year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Projection {
    pub hourly: Decimal,
    pub daily: Decimal,
    pub monthly: Decimal,
    pub yearly: Decimal,
}

impl Projection {
    pub fn from_hourly(hourly: Decimal) -> Self {
        let daily = hourly * HOURS_PER_DAY;
        Self {
            hourly,
            daily,
            monthly: daily * DAYS_PER_MONTH,
            yearly: daily * DAYS_PER_YEAR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_falls_back_to_eight_hours() {
        assert_eq!(IntervalHours::or_default(None).value(), dec!(8));
        assert_eq!(IntervalHours::or_default(Some(dec!(0))).value(), dec!(8));
        assert_eq!(IntervalHours::or_default(Some(dec!(-4))).value(), dec!(8));
        assert_eq!(IntervalHours::or_default(Some(dec!(4))).value(), dec!(4));
    }

    #[test]
    fn hourly_normalization() {
        let four = IntervalHours::new(dec!(4)).unwrap();
        assert_eq!(four.hourly(dec!(0.0004)), dec!(0.0001));
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(dec!(5), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(ratio(dec!(5), dec!(-1)), Decimal::ZERO);
        assert_eq!(ratio(dec!(5), dec!(2)), dec!(2.5));
    }

    #[test]
    fn projection_scales() {
        let p = Projection::from_hourly(dec!(0.5));
        assert_eq!(p.daily, dec!(12));
        assert_eq!(p.monthly, dec!(360));
        assert_eq!(p.yearly, dec!(4380));
    }

    #[test]
    fn hours_between_timestamps() {
        let t0 = Timestamp::from_millis(0);
        let t1 = Timestamp::from_millis(90 * 60 * 1000);
        assert_eq!(t0.hours_until(&t1), dec!(1.5));
        assert_eq!(t1.hours_until(&t0), Decimal::ZERO);
    }

    #[test]
    fn blank_symbol_rejected() {
        assert!(Symbol::new("  ").is_none());
        assert_eq!(Symbol::new(" ETHUSDT ").unwrap().as_str(), "ETHUSDT");
    }
}
