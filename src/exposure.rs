// 4.0 exposure.rs: open positions + rates + intervals + equity -> one exposure snapshot.
// 4.0 has the structs, 4.1+ the fold. every per-symbol rate is divided by its own
// interval before anything is summed across symbols.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::client::{
    parse_decimal, ClientError, SignedRequestClient, Transport, ACCOUNT_PATH, POSITION_RISK_PATH,
};
use crate::market_data::{MarketDataFetcher, MarketSnapshot};
use crate::types::{ratio, IntervalHours, Symbol, Timestamp};

/// One open position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub symbol: Symbol,
    // signed: negative is short
    pub amount: Decimal,
    pub mark_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentExposure {
    pub symbol: Symbol,
    pub notional: Decimal,
    pub abs_notional: Decimal,
    pub funding_rate: Decimal,
    pub interval_hours: IntervalHours,
}

impl InstrumentExposure {
    pub fn rate_per_hour(&self) -> Decimal {
        self.interval_hours.hourly(self.funding_rate)
    }

    // cash flow at the next settlement, native cadence
    pub fn next_fee(&self) -> Decimal {
        self.notional * self.funding_rate
    }

    pub fn hourly_fee(&self) -> Decimal {
        self.interval_hours.hourly(self.next_fee())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub timestamp: Timestamp,
    pub instruments: Vec<InstrumentExposure>,
    pub total_abs_notional: Decimal,
    pub account_equity: Decimal,
    pub leverage: Decimal,
    pub weighted_rate_numerator: Decimal,
    pub weighted_rate_per_hour: Decimal,
    pub estimated_next_fee: Decimal,
    pub estimated_hourly_fee: Decimal,
}

impl ExposureSnapshot {
    pub fn empty(timestamp: Timestamp, account_equity: Decimal) -> Self {
        Self::from_positions(timestamp, &[], &MarketSnapshot::default(), account_equity)
    }

    // 4.1: zero amount or zero mark contributes nothing anywhere.
    pub fn from_positions(
        timestamp: Timestamp,
        positions: &[Position],
        market: &MarketSnapshot,
        account_equity: Decimal,
    ) -> Self {
        let mut instruments = Vec::with_capacity(positions.len());
        let mut total_abs_notional = Decimal::ZERO;
        let mut weighted_rate_numerator = Decimal::ZERO;
        let mut estimated_next_fee = Decimal::ZERO;
        let mut estimated_hourly_fee = Decimal::ZERO;

        for position in positions {
            if position.amount.is_zero() || position.mark_price.is_zero() {
                continue;
            }
            let notional = position.amount * position.mark_price;
            let exposure = InstrumentExposure {
                symbol: position.symbol.clone(),
                notional,
                abs_notional: notional.abs(),
                funding_rate: market.rate_for(&position.symbol),
                interval_hours: market.interval_for(&position.symbol),
            };

            estimated_next_fee += exposure.next_fee();
            estimated_hourly_fee += exposure.hourly_fee();
            total_abs_notional += exposure.abs_notional;
            weighted_rate_numerator += exposure.rate_per_hour() * exposure.abs_notional;
            instruments.push(exposure);
        }

        Self {
            timestamp,
            instruments,
            total_abs_notional,
            account_equity,
            leverage: ratio(total_abs_notional, account_equity),
            weighted_rate_numerator,
            weighted_rate_per_hour: ratio(weighted_rate_numerator, total_abs_notional),
            estimated_next_fee,
            estimated_hourly_fee,
        }
    }

    pub fn has_exposure(&self) -> bool {
        self.total_abs_notional > Decimal::ZERO
    }
}

// 4.2: positionRisk rows. missing symbol or unparseable numbers drop the row.
pub fn parse_positions(body: &Value) -> Result<Vec<Position>, ClientError> {
    let rows = body
        .as_array()
        .ok_or_else(|| ClientError::Protocol("positionRisk response is not a list".to_string()))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let parsed = parse_position(row);
            if parsed.is_none() {
                debug!(row = %row, "skipping unparseable position row");
            }
            parsed
        })
        .collect())
}

fn parse_position(row: &Value) -> Option<Position> {
    let symbol = row.get("symbol")?.as_str().and_then(Symbol::new)?;
    let amount = parse_decimal(row.get("positionAmt")?)?;
    let mark_price = parse_decimal(row.get("markPrice")?)?;
    Some(Position {
        symbol,
        amount,
        mark_price,
    })
}

pub fn parse_account_equity(body: &Value) -> Result<Decimal, ClientError> {
    body.get("totalMarginBalance")
        .and_then(parse_decimal)
        .ok_or_else(|| ClientError::Protocol("totalMarginBalance missing from account".to_string()))
}

/** 4.3: fetches everything one snapshot needs. no shared state is touched here */
pub struct PositionExposureCollector<T> {
    client: Arc<SignedRequestClient<T>>,
    market: MarketDataFetcher<T>,
}

impl<T: Transport> PositionExposureCollector<T> {
    pub fn new(client: Arc<SignedRequestClient<T>>) -> Self {
        Self {
            market: MarketDataFetcher::new(Arc::clone(&client)),
            client,
        }
    }

    pub fn collect(&self, now: Timestamp) -> Result<ExposureSnapshot, ClientError> {
        let positions = parse_positions(&self.client.signed_request(POSITION_RISK_PATH, &[])?)?;
        let market = self.market.snapshot()?;
        let equity = parse_account_equity(&self.client.signed_request(ACCOUNT_PATH, &[])?)?;
        let snapshot = ExposureSnapshot::from_positions(now, &positions, &market, equity);
        debug!(
            positions = snapshot.instruments.len(),
            abs_notional = %snapshot.total_abs_notional,
            rate_per_hour = %snapshot.weighted_rate_per_hour,
            "exposure collected"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn position(symbol: &str, amount: Decimal, mark: Decimal) -> Position {
        Position {
            symbol: sym(symbol),
            amount,
            mark_price: mark,
        }
    }

    fn market(entries: &[(&str, Decimal, Decimal)]) -> MarketSnapshot {
        let mut snap = MarketSnapshot::default();
        for (symbol, rate, hours) in entries {
            snap.rates.insert(sym(symbol), *rate);
            snap.intervals.insert(sym(symbol), IntervalHours::new(*hours).unwrap());
        }
        snap
    }

    #[test]
    fn single_position_eight_hour_scenario() {
        let snap = ExposureSnapshot::from_positions(
            Timestamp::from_millis(0),
            &[position("BTCUSDT", dec!(10), dec!(100))],
            &market(&[("BTCUSDT", dec!(0.0004), dec!(8))]),
            dec!(500),
        );
        assert_eq!(snap.estimated_next_fee, dec!(0.4));
        assert_eq!(snap.estimated_hourly_fee, dec!(0.05));
        assert_eq!(snap.weighted_rate_numerator, dec!(0.05));
        assert_eq!(snap.total_abs_notional, dec!(1000));
        assert_eq!(snap.weighted_rate_per_hour, dec!(0.00005));
        assert_eq!(snap.leverage, dec!(2));
    }

    #[test]
    fn mixed_cadences_normalize_to_hourly() {
        // 1h symbol at 0.0001 and 8h symbol at 0.0008 are the same hourly rate
        let snap = ExposureSnapshot::from_positions(
            Timestamp::from_millis(0),
            &[
                position("AUSDT", dec!(1), dec!(1000)),
                position("BUSDT", dec!(-2), dec!(500)),
            ],
            &market(&[("AUSDT", dec!(0.0001), dec!(1)), ("BUSDT", dec!(0.0008), dec!(8))]),
            dec!(1000),
        );
        assert_eq!(snap.weighted_rate_per_hour, dec!(0.0001));
        // short pays negative: 1000*0.0001 - 1000*0.0008
        assert_eq!(snap.estimated_next_fee, dec!(-0.7));
        assert_eq!(snap.estimated_hourly_fee, Decimal::ZERO);
    }

    #[test]
    fn zero_rows_and_zero_equity() {
        let snap = ExposureSnapshot::from_positions(
            Timestamp::from_millis(0),
            &[
                position("AUSDT", Decimal::ZERO, dec!(100)),
                position("BUSDT", dec!(3), Decimal::ZERO),
            ],
            &market(&[("AUSDT", dec!(0.01), dec!(8)), ("BUSDT", dec!(0.01), dec!(8))]),
            Decimal::ZERO,
        );
        assert!(snap.instruments.is_empty());
        assert!(!snap.has_exposure());
        assert_eq!(snap.weighted_rate_per_hour, Decimal::ZERO);
        assert_eq!(snap.leverage, Decimal::ZERO);
        assert_eq!(snap.estimated_next_fee, Decimal::ZERO);
    }

    #[test]
    fn unknown_symbol_uses_zero_rate_and_default_interval() {
        let snap = ExposureSnapshot::from_positions(
            Timestamp::from_millis(0),
            &[position("NEWUSDT", dec!(1), dec!(50))],
            &MarketSnapshot::default(),
            dec!(100),
        );
        assert_eq!(snap.instruments[0].interval_hours.value(), dec!(8));
        assert_eq!(snap.estimated_next_fee, Decimal::ZERO);
        assert_eq!(snap.total_abs_notional, dec!(50));
        assert_eq!(snap.leverage, dec!(0.5));
    }

    #[test]
    fn position_rows_parse_leniently() {
        let body = json!([
            {"symbol": "BTCUSDT", "positionAmt": "0.010", "markPrice": "65000.5"},
            {"symbol": "ETHUSDT", "positionAmt": "x", "markPrice": "3000"},
            {"positionAmt": "1", "markPrice": "1"},
            {"symbol": "SOLUSDT", "positionAmt": "-2", "markPrice": 150}
        ]);
        let positions = parse_positions(&body).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].amount, dec!(0.01));
        assert_eq!(positions[1].mark_price, dec!(150));
        assert!(parse_positions(&json!({"code": -1})).is_err());
    }

    #[test]
    fn equity_required() {
        assert_eq!(
            parse_account_equity(&json!({"totalMarginBalance": "1234.5"})).unwrap(),
            dec!(1234.5)
        );
        assert!(matches!(
            parse_account_equity(&json!({})),
            Err(ClientError::Protocol(_))
        ));
    }
}
