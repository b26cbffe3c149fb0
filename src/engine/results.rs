// 10.0.2: tick results and the process-level error.

use crate::client::ClientError;
use crate::config::ConfigError;
use crate::exposure::ExposureSnapshot;
use crate::income::{Cursor, FundingEvent};
use crate::records::RecordError;

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub exposure: ExposureSnapshot,
    pub event: Option<FundingEvent>,
    pub cursor: Cursor,
    pub income_pages: usize,
}

impl TickOutcome {
    pub fn detected_funding(&self) -> bool {
        self.event.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exchange error: {0}")]
    Client(#[from] ClientError),

    #[error("Record log error: {0}")]
    Record(#[from] RecordError),
}

impl MonitorError {
    /// Distinct process status per failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MonitorError::Config(_) => 3,
            MonitorError::Client(_) => 2,
            MonitorError::Record(_) => 4,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config",
            MonitorError::Client(err) => err.class(),
            MonitorError::Record(_) => "record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let config = MonitorError::from(ConfigError::MissingCredentials);
        let client = MonitorError::from(ClientError::Protocol("bad".to_string()));
        let record = MonitorError::from(RecordError::Io {
            path: "x".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk"),
        });
        assert_eq!(config.exit_code(), 3);
        assert_eq!(client.exit_code(), 2);
        assert_eq!(record.exit_code(), 4);
        assert_eq!(client.class(), "protocol");
    }
}
