//! One scheduled tick.

use tracing::{info, warn};

use super::core::FundingMonitor;
use super::results::{MonitorError, TickOutcome};
use crate::client::Transport;
use crate::records::FundingRecord;
use crate::types::Timestamp;

impl<T: Transport> FundingMonitor<T> {
    // 10.2: fetch everything first, then one merge. a fetch error returns before
    // any state is touched, so the next tick retries from the same cursor.
    pub fn tick(&mut self, now: Timestamp) -> Result<TickOutcome, MonitorError> {
        let exposure = self.collector.collect(now)?;
        let recon = self.reconciler.reconcile(self.cursor, self.last_detection, now)?;

        self.aggregator.merge(&exposure, recon.event.as_ref());
        self.cursor = self.cursor.max(recon.cursor);
        if let Some(event) = &recon.event {
            self.last_detection = event.timestamp;
        }

        info!(
            position_value = %exposure.total_abs_notional,
            leverage = %exposure.leverage,
            rate_per_hour = %exposure.weighted_rate_per_hour,
            funding = recon.event.is_some(),
            "tick merged"
        );

        let outcome = TickOutcome {
            exposure,
            event: recon.event,
            cursor: self.cursor,
            income_pages: recon.pages,
        };
        self.persist(&outcome)?;
        Ok(outcome)
    }

    /// Like `tick`, but failures are logged and swallowed. Used by the scheduler loop.
    pub fn tick_logged(&mut self, now: Timestamp) -> Option<TickOutcome> {
        match self.tick(now) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(class = err.class(), error = %err, "tick failed, keeping previous state");
                None
            }
        }
    }

    // 10.3: the merge above already happened; a sink failure only loses the file copy
    fn persist(&mut self, outcome: &TickOutcome) -> Result<(), MonitorError> {
        if let Some(event) = &outcome.event {
            let record = FundingRecord::new(&outcome.exposure, event, outcome.cursor);
            self.sink.write(&record)?;
        }
        let metrics = self.aggregator.metrics();
        self.sink.write_summary(&metrics)?;
        Ok(())
    }
}
