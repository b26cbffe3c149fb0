//! Request-level errors.

use serde::Deserialize;

/// Exchange code for "timestamp outside recvWindow".
pub const TIMESTAMP_REJECTED_CODE: i64 = -1021;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timestamp rejected: {0}")]
    ClockSkew(String),

    #[error("api error {status} (code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },
}

impl ClientError {
    /// Transient failures the caller may retry on its next cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            ClientError::Protocol(_) | ClientError::ClockSkew(_) => false,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "transport",
            ClientError::Protocol(_) => "protocol",
            ClientError::ClockSkew(_) => "clock_skew",
            ClientError::Api { .. } => "api",
        }
    }

    // 2.0.1: non-2xx body -> tagged error. only -1021 becomes ClockSkew.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            code: i64,
            msg: String,
        }

        match serde_json::from_str::<ErrorBody>(body) {
            Ok(err) if err.code == TIMESTAMP_REJECTED_CODE => ClientError::ClockSkew(err.msg),
            Ok(err) => ClientError::Api {
                status,
                code: Some(err.code),
                message: err.msg,
            },
            Err(_) => ClientError::Api {
                status,
                code: None,
                message: body.to_string(),
            },
        }
    }
}
