// funding-monitor: incremental funding analytics for a perpetual-futures margin account.
// exposure is normalized to an hourly rate, realized income is reconciled behind a
// monotonic cursor, and everything derived is computed on read from cumulative sums.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, IntervalHours, Timestamp, ratio, Projection
//   2.x  client/: signed + public REST, HMAC signing, clock resync, transport seam
//   3.x  market_data.rs: funding rates and settlement intervals per symbol
//   4.x  exposure.rs: positions -> notional, leverage, weighted hourly rate
//   5.x  income.rs: cursor-paged realized income -> funding events
//   6.x  stats.rs: running sums, derived metrics, recent-event series, shared aggregator
//   6.5  scheduler.rs: fixed / hour-aligned wake, stop signal
//   7.x  config.rs: endpoints, paging, cadence, outputs, credentials
//   8.x  records.rs: append-only record log, summary file, replay source
//   9.x  publisher.rs: consistent snapshot copies for readers
//   10.x engine/: the monitor: tick, replay, errors

pub mod client;
pub mod config;
pub mod engine;
pub mod exposure;
pub mod income;
pub mod market_data;
pub mod publisher;
pub mod records;
pub mod scheduler;
pub mod stats;
pub mod types;

// re exports for convenience
pub use client::{ClientError, HttpTransport, MockTransport, SignedRequestClient, Transport};
pub use config::{log_filter, ConfigError, Credentials, Environment, MonitorConfig};
pub use engine::{FundingMonitor, MonitorError, TickOutcome};
pub use exposure::{ExposureSnapshot, InstrumentExposure, Position, PositionExposureCollector};
pub use income::{Cursor, FundingEvent, IncomeReconciler, Reconciliation};
pub use market_data::{MarketDataFetcher, MarketSnapshot};
pub use publisher::{Snapshot, SnapshotPublisher};
pub use records::{FundingRecord, JsonlRecordLog, MemorySink, RecordError, RecordSink};
pub use scheduler::{next_wake, ScheduleMode, Scheduler, SchedulerHandle, StopSignal};
pub use stats::{Metrics, RunningStats, RunningStatsAggregator, SeriesBuffer, SeriesPoint};
pub use types::*;
