//! Restart replay from the record log.

use tracing::info;

use super::core::FundingMonitor;
use crate::client::Transport;
use crate::income::Cursor;
use crate::records::FundingRecord;

impl<T: Transport> FundingMonitor<T> {
    /// Folds earlier records back into the aggregator and resumes the cursor after
    /// the last one, so restarted runs never count the same income twice.
    /// The log wins over the restart time; only an explicit start time acts as a floor.
    /// Returns how many records were applied.
    pub fn replay(&mut self, records: &[FundingRecord]) -> usize {
        for record in records {
            let (exposure, event) = record.to_parts();
            self.aggregator.merge(&exposure, Some(&event));
        }

        if let Some(last) = records.iter().max_by_key(|record| record.timestamp) {
            let cursor = records.iter().map(FundingRecord::cursor).fold(last.cursor(), Cursor::max);
            self.cursor = cursor;
            self.last_detection = last.timestamp;
            if let Some(floor) = self.start_floor {
                self.cursor = self.cursor.max(Cursor::starting_at(floor));
                self.last_detection = self.last_detection.max(floor);
            }
        }

        if !records.is_empty() {
            info!(
                records = records.len(),
                cursor_ms = self.cursor.last_seen_ms(),
                "record log replayed"
            );
        }
        records.len()
    }
}
