//! Lenient field parsing. the exchange sends numbers both as JSON strings and as JSON numbers.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(raw) => decimal_from_str(raw.trim()),
        Value::Number(num) => decimal_from_str(&num.to_string()),
        _ => None,
    }
}

pub fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        Value::Number(num) => num.as_i64(),
        _ => None,
    }
}

fn decimal_from_str(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn decimal_from_string_and_number() {
        assert_eq!(parse_decimal(&json!("0.00010000")), Some(dec!(0.0001)));
        assert_eq!(parse_decimal(&json!(8)), Some(dec!(8)));
        assert_eq!(parse_decimal(&json!("1e-4")), Some(dec!(0.0001)));
        assert_eq!(parse_decimal(&json!("abc")), None);
        assert_eq!(parse_decimal(&json!(null)), None);
    }

    #[test]
    fn integer_fields() {
        assert_eq!(parse_i64(&json!(1700000000000i64)), Some(1_700_000_000_000));
        assert_eq!(parse_i64(&json!("42")), Some(42));
        assert_eq!(parse_i64(&json!(1.5)), None);
    }
}
