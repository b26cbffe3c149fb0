// 5.0 income.rs: realized funding income since a monotonic cursor.
// the cursor only moves past event times already summed, so a rerun with nothing new
// on the server fetches an empty page and produces no event.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{parse_decimal, parse_i64, ClientError, SignedRequestClient, Transport, INCOME_PATH};
use crate::config::{MonitorConfig, MAX_INCOME_PAGE_SIZE};
use crate::types::{Symbol, Timestamp};

pub const FUNDING_FEE_INCOME: &str = "FUNDING_FEE";

// floor for window_hours so per-event hourly rates never divide by zero
pub const MIN_WINDOW_HOURS: Decimal = dec!(0.000001);

/// Last income event time already counted. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    last_seen_ms: i64,
}

impl Cursor {
    pub fn new(last_seen_ms: i64) -> Self {
        Self { last_seen_ms }
    }

    /// Cursor for a fresh start: nothing before `start` is counted.
    pub fn starting_at(start: Timestamp) -> Self {
        Self::new(start.as_millis() - 1)
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms
    }

    pub fn next_start_ms(&self) -> i64 {
        self.last_seen_ms + 1
    }

    pub fn advance_to(&mut self, seen: Timestamp) {
        self.last_seen_ms = self.last_seen_ms.max(seen.as_millis());
    }

    pub fn max(self, other: Cursor) -> Cursor {
        Ord::max(self, other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomeRow {
    pub time: Timestamp,
    pub income: Decimal,
    pub symbol: Option<Symbol>,
}

/// One detected batch of realized funding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingEvent {
    pub timestamp: Timestamp,
    pub net: Decimal,
    pub received: Decimal,
    pub paid: Decimal,
    // wall-clock hours since the previous detection
    pub window_hours: Decimal,
    pub rows: usize,
}

impl FundingEvent {
    pub fn hourly_rate(&self) -> Decimal {
        crate::types::ratio(self.net, self.window_hours)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IncomeTotals {
    rows: usize,
    net: Decimal,
    received: Decimal,
    paid: Decimal,
}

impl IncomeTotals {
    fn absorb(&mut self, row: &IncomeRow) {
        self.rows += 1;
        self.net += row.income;
        if row.income >= Decimal::ZERO {
            self.received += row.income;
        } else {
            self.paid -= row.income;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub cursor: Cursor,
    pub event: Option<FundingEvent>,
    pub pages: usize,
}

// 5.1: one income page. `raw_len` counts every row the server sent so the
// short-page check is not fooled by rows we could not parse.
pub struct IncomePage {
    pub raw_len: usize,
    pub rows: Vec<IncomeRow>,
}

pub fn parse_income_page(body: &Value) -> Result<IncomePage, ClientError> {
    let items = body
        .as_array()
        .ok_or_else(|| ClientError::Protocol("income response is not a list".to_string()))?;

    let rows = items
        .iter()
        .filter_map(|item| {
            let time = item.get("time").and_then(parse_i64);
            let income = item.get("income").and_then(parse_decimal);
            match (time, income) {
                (Some(time), Some(income)) => Some(IncomeRow {
                    time: Timestamp::from_millis(time),
                    income,
                    symbol: item.get("symbol").and_then(Value::as_str).and_then(Symbol::new),
                }),
                _ => {
                    debug!(row = %item, "skipping unparseable income row");
                    None
                }
            }
        })
        .collect();

    Ok(IncomePage {
        raw_len: items.len(),
        rows,
    })
}

/** 5.2: pages income history forward from the cursor */
pub struct IncomeReconciler<T> {
    client: Arc<SignedRequestClient<T>>,
    page_size: usize,
    max_pages: usize,
}

impl<T: Transport> IncomeReconciler<T> {
    pub fn new(client: Arc<SignedRequestClient<T>>, config: &MonitorConfig) -> Self {
        Self {
            client,
            page_size: config.income_page_size.clamp(1, MAX_INCOME_PAGE_SIZE),
            max_pages: config.income_max_pages.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn reconcile(
        &self,
        cursor: Cursor,
        last_detection: Timestamp,
        now: Timestamp,
    ) -> Result<Reconciliation, ClientError> {
        self.reconcile_until(cursor, last_detection, now, None)
    }

    // 5.3: the window ends at min(now - 1, requested_end) so endTime is never in the future.
    // on error nothing is returned, so the caller's cursor stays where it was.
    pub fn reconcile_until(
        &self,
        cursor: Cursor,
        last_detection: Timestamp,
        now: Timestamp,
        requested_end: Option<Timestamp>,
    ) -> Result<Reconciliation, ClientError> {
        let end_ms = match requested_end {
            Some(end) => end.as_millis().min(now.as_millis() - 1),
            None => now.as_millis() - 1,
        };

        let mut working = cursor;
        let mut totals = IncomeTotals::default();
        let mut pages = 0;

        while pages < self.max_pages {
            let start_ms = working.next_start_ms();
            if start_ms > end_ms {
                break;
            }

            let body = self.client.signed_request(
                INCOME_PATH,
                &[
                    ("incomeType", FUNDING_FEE_INCOME.to_string()),
                    ("startTime", start_ms.to_string()),
                    ("endTime", end_ms.to_string()),
                    ("limit", self.page_size.to_string()),
                ],
            )?;
            let page = parse_income_page(&body)?;
            pages += 1;

            let before = working;
            // rows before the requested start were already counted
            for row in page.rows.iter().filter(|row| row.time.as_millis() >= start_ms) {
                totals.absorb(row);
                working.advance_to(row.time);
            }
            debug!(page = pages, rows = page.raw_len, start_ms, end_ms, "income page fetched");

            if page.raw_len < self.page_size {
                break;
            }
            if working == before {
                warn!(start_ms, "full income page did not advance the cursor, stopping");
                break;
            }
        }

        if pages == self.max_pages && pages > 0 {
            debug!(max_pages = self.max_pages, "income page limit reached, resuming next tick");
        }

        let event = if totals.rows > 0 {
            let window_hours = last_detection.hours_until(&now).max(MIN_WINDOW_HOURS);
            info!(
                rows = totals.rows,
                net = %totals.net,
                window_hours = %window_hours,
                "funding event detected"
            );
            Some(FundingEvent {
                timestamp: now,
                net: totals.net,
                received: totals.received,
                paid: totals.paid,
                window_hours,
                rows: totals.rows,
            })
        } else {
            None
        };

        Ok(Reconciliation {
            cursor: if event.is_some() { working } else { cursor },
            event,
            pages,
        })
    }
}
