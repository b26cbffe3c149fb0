// 6.0 stats.rs: cumulative funding sums plus a bounded series of recent events.
// only sums are stored. every rate and projection is derived on read through ratio(),
// so an empty book reads as all zeros.
// 6.4 the aggregator is the one piece of shared state: one writer, any number of readers, one lock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::exposure::ExposureSnapshot;
use crate::income::FundingEvent;
use crate::types::{ratio, Projection, Timestamp, DAYS_PER_YEAR, HOURS_PER_DAY};

/// Most recent exposure observation. Overwritten every tick, never summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestExposure {
    pub timestamp: Option<Timestamp>,
    pub position_value: Decimal,
    pub account_equity: Decimal,
    pub leverage: Decimal,
    pub weighted_rate_per_hour: Decimal,
    pub estimated_next_fee: Decimal,
    pub estimated_hourly_fee: Decimal,
}

impl LatestExposure {
    fn observe(&mut self, exposure: &ExposureSnapshot) {
        *self = Self {
            timestamp: Some(exposure.timestamp),
            position_value: exposure.total_abs_notional,
            account_equity: exposure.account_equity,
            leverage: exposure.leverage,
            weighted_rate_per_hour: exposure.weighted_rate_per_hour,
            estimated_next_fee: exposure.estimated_next_fee,
            estimated_hourly_fee: exposure.estimated_hourly_fee,
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub total_hours: Decimal,
    pub net: Decimal,
    pub received: Decimal,
    pub paid: Decimal,
    pub weighted_rate_numerator: Decimal,
    pub weighted_rate_denominator: Decimal,
    pub estimated_hourly_sum: Decimal,
    pub latest: LatestExposure,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    // 6.1: latest exposure always; sums only when realized income was seen.
    // the weighted rate is weighted by this tick's absolute notional.
    pub fn update(&mut self, exposure: &ExposureSnapshot, event: Option<&FundingEvent>) {
        self.latest.observe(exposure);

        if let Some(event) = event {
            self.count += 1;
            self.total_hours += event.window_hours;
            self.net += event.net;
            self.received += event.received;
            self.paid += event.paid;
            self.estimated_hourly_sum += exposure.estimated_hourly_fee;
            self.weighted_rate_numerator += exposure.weighted_rate_per_hour * exposure.total_abs_notional;
            self.weighted_rate_denominator += exposure.total_abs_notional;
        }
    }

    // 6.2: derived view, recomputed on every call
    pub fn metrics(&self) -> Metrics {
        let net = Projection::from_hourly(ratio(self.net, self.total_hours));
        let weighted_rate =
            Projection::from_hourly(ratio(self.weighted_rate_numerator, self.weighted_rate_denominator));
        let pnl_rate_daily = ratio(net.daily, self.latest.position_value);

        Metrics {
            count: self.count,
            total_hours: self.total_hours,
            net_total: self.net,
            received_total: self.received,
            paid_total: self.paid,
            net,
            received_daily: ratio(self.received, self.total_hours) * HOURS_PER_DAY,
            paid_daily: ratio(self.paid, self.total_hours) * HOURS_PER_DAY,
            weighted_rate,
            avg_estimated_hourly_fee: ratio(self.estimated_hourly_sum, Decimal::from(self.count)),
            position_value: self.latest.position_value,
            account_equity: self.latest.account_equity,
            leverage: self.latest.leverage,
            pnl_rate_daily,
            pnl_rate_yearly: pnl_rate_daily * DAYS_PER_YEAR,
        }
    }
}

/// Derived view of the running sums.
///
/// `position_value`, `account_equity` and `leverage` are the latest observation,
/// not derived from the sums: they are set by every tick, even before the first
/// funding event. Every other field is exactly zero while `count == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub count: u64,
    pub total_hours: Decimal,
    pub net_total: Decimal,
    pub received_total: Decimal,
    pub paid_total: Decimal,
    pub net: Projection,
    pub received_daily: Decimal,
    pub paid_daily: Decimal,
    pub weighted_rate: Projection,
    pub avg_estimated_hourly_fee: Decimal,
    // observed
    pub position_value: Decimal,
    pub account_equity: Decimal,
    pub leverage: Decimal,
    pub pnl_rate_daily: Decimal,
    pub pnl_rate_yearly: Decimal,
}

impl Metrics {
    /// Flat key/value view, in a stable order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("count", self.count.to_string()),
            ("total_hours", self.total_hours.normalize().to_string()),
            ("net_total", self.net_total.normalize().to_string()),
            ("received_total", self.received_total.normalize().to_string()),
            ("paid_total", self.paid_total.normalize().to_string()),
            ("net_hourly", self.net.hourly.normalize().to_string()),
            ("net_daily", self.net.daily.normalize().to_string()),
            ("net_monthly", self.net.monthly.normalize().to_string()),
            ("net_yearly", self.net.yearly.normalize().to_string()),
            ("received_daily", self.received_daily.normalize().to_string()),
            ("paid_daily", self.paid_daily.normalize().to_string()),
            ("weighted_rate_hourly", self.weighted_rate.hourly.normalize().to_string()),
            ("weighted_rate_daily", self.weighted_rate.daily.normalize().to_string()),
            ("weighted_rate_monthly", self.weighted_rate.monthly.normalize().to_string()),
            ("weighted_rate_yearly", self.weighted_rate.yearly.normalize().to_string()),
            ("avg_estimated_hourly_fee", self.avg_estimated_hourly_fee.normalize().to_string()),
            ("position_value", self.position_value.normalize().to_string()),
            ("account_equity", self.account_equity.normalize().to_string()),
            ("leverage", self.leverage.normalize().to_string()),
            ("pnl_rate_daily", self.pnl_rate_daily.normalize().to_string()),
            ("pnl_rate_yearly", self.pnl_rate_yearly.normalize().to_string()),
        ]
    }
}

/// One detected event as shown in the recent-events series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub net: Decimal,
    pub window_hours: Decimal,
    pub hourly_rate: Decimal,
    pub weighted_rate_per_hour: Decimal,
}

impl SeriesPoint {
    pub fn new(exposure: &ExposureSnapshot, event: &FundingEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            net: event.net,
            window_hours: event.window_hours,
            hourly_rate: event.hourly_rate(),
            weighted_rate_per_hour: exposure.weighted_rate_per_hour,
        }
    }
}

// 6.3: fixed-size ring. display cache only; evicts oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesBuffer {
    capacity: usize,
    points: VecDeque<SeriesPoint>,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: SeriesPoint) {
        if self.capacity == 0 {
            return;
        }
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<SeriesPoint> {
        self.points.iter().copied().collect()
    }
}

#[derive(Debug, Default)]
pub struct StatsBook {
    pub stats: RunningStats,
    pub series: SeriesBuffer,
}

/** 6.4: shared handle. clones point at the same book */
#[derive(Debug, Clone)]
pub struct RunningStatsAggregator {
    book: Arc<Mutex<StatsBook>>,
}

impl RunningStatsAggregator {
    pub fn new(series_capacity: usize) -> Self {
        Self {
            book: Arc::new(Mutex::new(StatsBook {
                stats: RunningStats::new(),
                series: SeriesBuffer::new(series_capacity),
            })),
        }
    }

    // the book holds plain sums, so a poisoned lock is still consistent
    fn lock(&self) -> MutexGuard<'_, StatsBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Exposure and event land together under one lock acquisition.
    pub fn merge(&self, exposure: &ExposureSnapshot, event: Option<&FundingEvent>) {
        let mut book = self.lock();
        book.stats.update(exposure, event);
        if let Some(event) = event {
            book.series.push(SeriesPoint::new(exposure, event));
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.lock().stats.metrics()
    }

    pub fn stats(&self) -> RunningStats {
        self.lock().stats.clone()
    }

    /// Runs `read` against the book while holding the lock.
    pub fn read_with<R>(&self, read: impl FnOnce(&StatsBook) -> R) -> R {
        read(&self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exposure(abs_notional: Decimal, rate_per_hour: Decimal, hourly_fee: Decimal, equity: Decimal) -> ExposureSnapshot {
        ExposureSnapshot {
            timestamp: Timestamp::from_millis(1),
            instruments: Vec::new(),
            total_abs_notional: abs_notional,
            account_equity: equity,
            leverage: ratio(abs_notional, equity),
            weighted_rate_numerator: rate_per_hour * abs_notional,
            weighted_rate_per_hour: rate_per_hour,
            estimated_next_fee: hourly_fee * dec!(8),
            estimated_hourly_fee: hourly_fee,
        }
    }

    fn event(net: Decimal, hours: Decimal) -> FundingEvent {
        FundingEvent {
            timestamp: Timestamp::from_millis(2),
            net,
            received: net.max(Decimal::ZERO),
            paid: (-net).max(Decimal::ZERO),
            window_hours: hours,
            rows: 1,
        }
    }

    #[test]
    fn empty_metrics_are_zero() {
        let metrics = RunningStats::new().metrics();
        assert_eq!(metrics, Metrics::default());
        assert!(metrics.to_pairs().iter().all(|(_, v)| v == "0"));
    }

    #[test]
    fn hourly_average_is_net_over_hours() {
        let mut stats = RunningStats::new();
        stats.update(&exposure(dec!(1000), dec!(0.00005), dec!(0.05), dec!(500)), Some(&event(dec!(0.4), dec!(8))));
        let m = stats.metrics();
        assert_eq!(m.net.hourly, dec!(0.05));
        assert_eq!(m.net.daily, dec!(1.2));
        assert_eq!(m.net.monthly, dec!(36));
        assert_eq!(m.net.yearly, dec!(438));
        assert_eq!(m.weighted_rate.hourly, dec!(0.00005));
        assert_eq!(m.avg_estimated_hourly_fee, dec!(0.05));
        assert_eq!(m.received_daily, dec!(1.2));
        assert_eq!(m.paid_daily, Decimal::ZERO);
        assert_eq!(m.pnl_rate_daily, dec!(0.0012));
        assert_eq!(m.pnl_rate_yearly, dec!(0.438));
        assert_eq!(m.leverage, dec!(2));
    }

    #[test]
    fn exposure_without_event_only_touches_latest() {
        let mut stats = RunningStats::new();
        stats.update(&exposure(dec!(2000), dec!(0.0001), dec!(0.2), dec!(1000)), None);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.weighted_rate_denominator, Decimal::ZERO);
        let m = stats.metrics();
        assert_eq!(m.position_value, dec!(2000));
        assert_eq!(m.leverage, dec!(2));
        assert_eq!(m.net.hourly, Decimal::ZERO);
        assert_eq!(m.pnl_rate_daily, Decimal::ZERO);

        // only the observed fields differ from an empty book
        let observed_only = Metrics {
            position_value: m.position_value,
            account_equity: m.account_equity,
            leverage: m.leverage,
            ..Metrics::default()
        };
        assert_eq!(m, observed_only);
    }

    #[test]
    fn weighted_rate_is_notional_weighted_across_events() {
        let mut stats = RunningStats::new();
        stats.update(&exposure(dec!(1000), dec!(0.0001), dec!(0.1), dec!(1000)), Some(&event(dec!(1), dec!(1))));
        stats.update(&exposure(dec!(3000), dec!(0.0002), dec!(0.6), dec!(1000)), Some(&event(dec!(1), dec!(1))));
        // (0.1 + 0.6) / 4000
        assert_eq!(stats.metrics().weighted_rate.hourly, dec!(0.000175));
        assert_eq!(stats.metrics().avg_estimated_hourly_fee, dec!(0.35));
    }

    #[test]
    fn series_evicts_oldest() {
        let mut series = SeriesBuffer::new(2);
        let snap = exposure(dec!(1), dec!(0), dec!(0), dec!(1));
        for net in [dec!(1), dec!(2), dec!(3)] {
            series.push(SeriesPoint::new(&snap, &event(net, dec!(1))));
        }
        let nets: Vec<Decimal> = series.to_vec().iter().map(|p| p.net).collect();
        assert_eq!(nets, vec![dec!(2), dec!(3)]);

        let mut none = SeriesBuffer::new(0);
        none.push(SeriesPoint::new(&snap, &event(dec!(1), dec!(1))));
        assert!(none.is_empty());
    }

    #[test]
    fn aggregator_merges_under_one_lock() {
        let agg = RunningStatsAggregator::new(4);
        let reader = agg.clone();
        agg.merge(&exposure(dec!(100), dec!(0.001), dec!(0.1), dec!(50)), Some(&event(dec!(-0.3), dec!(3))));
        let (count, points) = reader.read_with(|book| (book.stats.count, book.series.len()));
        assert_eq!((count, points), (1, 1));
        assert_eq!(reader.metrics().paid_total, dec!(0.3));
        assert_eq!(reader.metrics().net.hourly, dec!(-0.1));
    }
}
