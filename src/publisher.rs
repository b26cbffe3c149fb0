// 9.0 publisher.rs: read side for external consumers. every read is a copy taken under
// the aggregator lock, so a reader never sees half of a tick.

use serde::{Deserialize, Serialize};

use crate::stats::{LatestExposure, Metrics, RunningStatsAggregator, SeriesPoint};
use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: Timestamp,
    pub metrics: Metrics,
    pub series: Vec<SeriesPoint>,
    pub latest: LatestExposure,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    aggregator: RunningStatsAggregator,
}

impl SnapshotPublisher {
    pub fn new(aggregator: RunningStatsAggregator) -> Self {
        Self { aggregator }
    }

    /// Last known-good state. Failed ticks never reach the aggregator, so this cannot fail.
    pub fn read(&self) -> Snapshot {
        let taken_at = Timestamp::now();
        self.aggregator.read_with(|book| Snapshot {
            taken_at,
            metrics: book.stats.metrics(),
            series: book.series.to_vec(),
            latest: book.stats.latest,
        })
    }

    pub fn metrics(&self) -> Metrics {
        self.aggregator.metrics()
    }
}
