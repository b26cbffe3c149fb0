// 10.0: the monitor. owns the collectors, the income cursor and the shared aggregator,
// and turns one wake into one atomic merge. network I/O always happens before the lock.

mod core;
mod replay;
mod results;
mod tick;

pub use core::FundingMonitor;
pub use results::{MonitorError, TickOutcome};
