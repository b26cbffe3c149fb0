// 10.0 engine/core.rs: the monitor struct. all mutable run state lives here or behind the aggregator.

use std::sync::Arc;

use crate::client::{SignedRequestClient, Transport};
use crate::config::MonitorConfig;
use crate::exposure::PositionExposureCollector;
use crate::income::{Cursor, IncomeReconciler};
use crate::publisher::SnapshotPublisher;
use crate::records::RecordSink;
use crate::stats::RunningStatsAggregator;
use crate::types::Timestamp;

/** 10.1: single writer. the scheduler drives tick(), readers go through publisher() */
pub struct FundingMonitor<T> {
    pub(super) client: Arc<SignedRequestClient<T>>,
    pub(super) collector: PositionExposureCollector<T>,
    pub(super) reconciler: IncomeReconciler<T>,
    pub(super) aggregator: RunningStatsAggregator,
    pub(super) sink: Box<dyn RecordSink>,
    pub(super) cursor: Cursor,
    // wall clock of the previous funding detection, start of the next window
    pub(super) last_detection: Timestamp,
    // explicit start time; a replayed log never resumes before it
    pub(super) start_floor: Option<Timestamp>,
}

impl<T: Transport> FundingMonitor<T> {
    /// Income before `config.start_time` (or before `now` without one) is never counted.
    pub fn new(
        client: Arc<SignedRequestClient<T>>,
        config: &MonitorConfig,
        sink: Box<dyn RecordSink>,
        now: Timestamp,
    ) -> Self {
        let start_floor = config.start_time.map(Timestamp::from_datetime);
        let start = start_floor.unwrap_or(now);
        Self {
            collector: PositionExposureCollector::new(Arc::clone(&client)),
            reconciler: IncomeReconciler::new(Arc::clone(&client), config),
            client,
            aggregator: RunningStatsAggregator::new(config.series_capacity),
            sink,
            cursor: Cursor::starting_at(start),
            last_detection: start,
            start_floor,
        }
    }

    pub fn client(&self) -> &SignedRequestClient<T> {
        &self.client
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn last_detection(&self) -> Timestamp {
        self.last_detection
    }

    pub fn aggregator(&self) -> RunningStatsAggregator {
        self.aggregator.clone()
    }

    pub fn publisher(&self) -> SnapshotPublisher {
        SnapshotPublisher::new(self.aggregator.clone())
    }
}
