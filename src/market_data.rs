// 3.0 market_data.rs: unauthenticated lookups. current funding rate and settlement cadence per symbol.
// rates are quoted per each symbol's own cadence (1h/4h/8h); the interval map is what lets
// the exposure collector put them on a common hourly basis.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::{parse_decimal, ClientError, SignedRequestClient, Transport};
use crate::types::{IntervalHours, Symbol};

pub const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";
pub const FUNDING_INFO_PATH: &str = "/fapi/v1/fundingInfo";

/// Rates and intervals fetched together for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub rates: HashMap<Symbol, Decimal>,
    pub intervals: HashMap<Symbol, IntervalHours>,
}

impl MarketSnapshot {
    /// Missing symbols carry no funding.
    pub fn rate_for(&self, symbol: &Symbol) -> Decimal {
        self.rates.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Missing symbols settle on the 8h default.
    pub fn interval_for(&self, symbol: &Symbol) -> IntervalHours {
        self.intervals.get(symbol).copied().unwrap_or_default()
    }
}

pub struct MarketDataFetcher<T> {
    client: Arc<SignedRequestClient<T>>,
}

impl<T: Transport> MarketDataFetcher<T> {
    pub fn new(client: Arc<SignedRequestClient<T>>) -> Self {
        Self { client }
    }

    pub fn current_rates(&self) -> Result<HashMap<Symbol, Decimal>, ClientError> {
        let body = self.client.public_request(PREMIUM_INDEX_PATH)?;
        parse_rates(&body)
    }

    pub fn interval_hours(&self) -> Result<HashMap<Symbol, IntervalHours>, ClientError> {
        let body = self.client.public_request(FUNDING_INFO_PATH)?;
        parse_intervals(&body)
    }

    pub fn snapshot(&self) -> Result<MarketSnapshot, ClientError> {
        Ok(MarketSnapshot {
            rates: self.current_rates()?,
            intervals: self.interval_hours()?,
        })
    }
}

// 3.1: premiumIndex is an object for one symbol, a list for all of them.
pub fn parse_rates(body: &Value) -> Result<HashMap<Symbol, Decimal>, ClientError> {
    let rows: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![body],
        _ => {
            return Err(ClientError::Protocol(
                "premiumIndex response is neither object nor list".to_string(),
            ))
        }
    };

    let mut rates = HashMap::with_capacity(rows.len());
    for row in rows {
        let symbol = row.get("symbol").and_then(Value::as_str).and_then(Symbol::new);
        let rate = row.get("lastFundingRate").and_then(parse_decimal);
        match (symbol, rate) {
            (Some(symbol), Some(rate)) => {
                rates.insert(symbol, rate);
            }
            _ => debug!(row = %row, "skipping unparseable premium index row"),
        }
    }
    Ok(rates)
}

// 3.2: only positive intervals are kept; callers default the rest to 8h.
pub fn parse_intervals(body: &Value) -> Result<HashMap<Symbol, IntervalHours>, ClientError> {
    let items = body
        .as_array()
        .ok_or_else(|| ClientError::Protocol("fundingInfo response is not a list".to_string()))?;

    let mut intervals = HashMap::with_capacity(items.len());
    for row in items {
        let symbol = row.get("symbol").and_then(Value::as_str).and_then(Symbol::new);
        let hours = row
            .get("fundingIntervalHours")
            .and_then(parse_decimal)
            .and_then(IntervalHours::new);
        if let (Some(symbol), Some(hours)) = (symbol, hours) {
            intervals.insert(symbol, hours);
        }
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn rates_from_list_skip_bad_rows() {
        let body = json!([
            {"symbol": "BTCUSDT", "lastFundingRate": "0.00010000"},
            {"symbol": "ETHUSDT", "lastFundingRate": "n/a"},
            {"lastFundingRate": "0.0002"},
            {"symbol": "SOLUSDT", "lastFundingRate": -0.0003}
        ]);
        let rates = parse_rates(&body).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[&sym("BTCUSDT")], dec!(0.0001));
        assert_eq!(rates[&sym("SOLUSDT")], dec!(-0.0003));
    }

    #[test]
    fn rates_from_single_object() {
        let body = json!({"symbol": "BTCUSDT", "lastFundingRate": "0.0004"});
        assert_eq!(parse_rates(&body).unwrap()[&sym("BTCUSDT")], dec!(0.0004));
        assert!(parse_rates(&json!("oops")).is_err());
    }

    #[test]
    fn intervals_drop_non_positive() {
        let body = json!([
            {"symbol": "BTCUSDT", "fundingIntervalHours": 8},
            {"symbol": "XRPUSDT", "fundingIntervalHours": 4},
            {"symbol": "BADUSDT", "fundingIntervalHours": 0},
            {"symbol": "NULLUSDT", "fundingIntervalHours": null}
        ]);
        let intervals = parse_intervals(&body).unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[&sym("XRPUSDT")].value(), dec!(4));
        assert!(parse_intervals(&json!({})).is_err());
    }

    #[test]
    fn snapshot_defaults() {
        let snap = MarketSnapshot::default();
        assert_eq!(snap.rate_for(&sym("BTCUSDT")), Decimal::ZERO);
        assert_eq!(snap.interval_for(&sym("BTCUSDT")).value(), dec!(8));
    }
}
