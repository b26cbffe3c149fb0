// 8.0 records.rs: durable output. one record per detected funding event, appended and
// never rewritten, plus a summary file overwritten with the current metrics every tick.
// the log doubles as restart state: replaying it restores sums and the income cursor.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::exposure::ExposureSnapshot;
use crate::income::{Cursor, FundingEvent};
use crate::stats::Metrics;
use crate::types::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RecordError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        RecordError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Everything known at the moment a funding event was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub timestamp: Timestamp,
    pub net: Decimal,
    pub received: Decimal,
    pub paid: Decimal,
    pub window_hours: Decimal,
    pub estimated_next_fee: Decimal,
    pub estimated_hourly_fee: Decimal,
    pub total_abs_notional: Decimal,
    pub weighted_rate_per_hour: Decimal,
    pub account_equity: Decimal,
    pub leverage: Decimal,
    pub cursor_ms: i64,
}

impl FundingRecord {
    pub fn new(exposure: &ExposureSnapshot, event: &FundingEvent, cursor: Cursor) -> Self {
        Self {
            timestamp: event.timestamp,
            net: event.net,
            received: event.received,
            paid: event.paid,
            window_hours: event.window_hours,
            estimated_next_fee: exposure.estimated_next_fee,
            estimated_hourly_fee: exposure.estimated_hourly_fee,
            total_abs_notional: exposure.total_abs_notional,
            weighted_rate_per_hour: exposure.weighted_rate_per_hour,
            account_equity: exposure.account_equity,
            leverage: exposure.leverage,
            cursor_ms: cursor.last_seen_ms(),
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.cursor_ms)
    }

    // 8.1: rebuild the tick inputs so replay folds through the same update path.
    // per-instrument detail is not persisted.
    pub fn to_parts(&self) -> (ExposureSnapshot, FundingEvent) {
        let exposure = ExposureSnapshot {
            timestamp: self.timestamp,
            instruments: Vec::new(),
            total_abs_notional: self.total_abs_notional,
            account_equity: self.account_equity,
            leverage: self.leverage,
            weighted_rate_numerator: self.weighted_rate_per_hour * self.total_abs_notional,
            weighted_rate_per_hour: self.weighted_rate_per_hour,
            estimated_next_fee: self.estimated_next_fee,
            estimated_hourly_fee: self.estimated_hourly_fee,
        };
        let event = FundingEvent {
            timestamp: self.timestamp,
            net: self.net,
            received: self.received,
            paid: self.paid,
            window_hours: self.window_hours,
            rows: 0,
        };
        (exposure, event)
    }
}

/// Where records and summaries go. Failures are reported, never fatal to a tick.
pub trait RecordSink: Send {
    fn write(&mut self, record: &FundingRecord) -> Result<(), RecordError>;
    fn write_summary(&mut self, metrics: &Metrics) -> Result<(), RecordError>;
}

// 8.2: JSON lines on disk. either path may be absent, which turns that half into a no-op.
#[derive(Debug, Clone, Default)]
pub struct JsonlRecordLog {
    record_path: Option<PathBuf>,
    summary_path: Option<PathBuf>,
}

impl JsonlRecordLog {
    pub fn new(record_path: Option<PathBuf>, summary_path: Option<PathBuf>) -> Self {
        Self {
            record_path,
            summary_path,
        }
    }

    pub fn record_path(&self) -> Option<&Path> {
        self.record_path.as_deref()
    }

    /// Records at or after `since`, oldest first. A missing file is an empty log.
    pub fn load(&self, since: Option<Timestamp>) -> Result<Vec<FundingRecord>, RecordError> {
        match &self.record_path {
            Some(path) => load_records(path, since),
            None => Ok(Vec::new()),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), RecordError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|err| RecordError::io(parent, err))
        }
        _ => Ok(()),
    }
}

impl RecordSink for JsonlRecordLog {
    fn write(&mut self, record: &FundingRecord) -> Result<(), RecordError> {
        let Some(path) = &self.record_path else {
            return Ok(());
        };
        ensure_parent(path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| RecordError::io(path, err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| RecordError::io(path, err))?;
        debug!(path = %path.display(), "funding record appended");
        Ok(())
    }

    fn write_summary(&mut self, metrics: &Metrics) -> Result<(), RecordError> {
        let Some(path) = &self.summary_path else {
            return Ok(());
        };
        ensure_parent(path)?;
        let file = File::create(path).map_err(|err| RecordError::io(path, err))?;
        let mut out = BufWriter::new(file);
        let mut emit = || -> std::io::Result<()> {
            writeln!(out, "key,value")?;
            for (key, value) in metrics.to_pairs() {
                writeln!(out, "{key},{value}")?;
            }
            out.flush()
        };
        emit().map_err(|err| RecordError::io(path, err))
    }
}

pub fn load_records(path: &Path, since: Option<Timestamp>) -> Result<Vec<FundingRecord>, RecordError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(RecordError::io(path, err)),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| RecordError::io(path, err))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FundingRecord>(&line) {
            Ok(record) if since.map_or(true, |since| record.timestamp >= since) => records.push(record),
            Ok(_) => {}
            Err(err) => warn!(line = index + 1, error = %err, "skipping malformed record"),
        }
    }
    records.sort_by_key(|record| record.timestamp);
    Ok(records)
}

/// In-memory sink. Clones share storage, so a test can keep one and hand the other away.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FundingRecord>>>,
    summaries: Arc<Mutex<Vec<Metrics>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FundingRecord> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn last_summary(&self) -> Option<Metrics> {
        self.summaries.lock().unwrap_or_else(|p| p.into_inner()).last().copied()
    }

    pub fn summary_count(&self) -> usize {
        self.summaries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: &FundingRecord) -> Result<(), RecordError> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn write_summary(&mut self, metrics: &Metrics) -> Result<(), RecordError> {
        self.summaries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(*metrics);
        Ok(())
    }
}
