//! Signed request client with clock-drift correction.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::signing::{canonical_query, sign_query};
use super::transport::{HttpRequest, Transport};
use super::wire::parse_i64;
use super::ClientError;
use crate::config::{Credentials, MonitorConfig};
use crate::types::Timestamp;

pub const POSITION_RISK_PATH: &str = "/fapi/v2/positionRisk";
pub const ACCOUNT_PATH: &str = "/fapi/v2/account";
pub const INCOME_PATH: &str = "/fapi/v1/income";
pub const SERVER_TIME_PATH: &str = "/fapi/v1/time";

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

type ClockFn = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Builds authenticated requests and keeps the local-to-server clock offset.
///
/// Shared by reference between the exposure collector and the income reconciler;
/// the offset is atomic so `&self` is enough for every call.
pub struct SignedRequestClient<T> {
    transport: T,
    base_url: String,
    credentials: Credentials,
    recv_window_ms: u64,
    offset_ms: AtomicI64,
    clock: ClockFn,
}

impl<T: Transport> SignedRequestClient<T> {
    pub fn new(transport: T, config: &MonitorConfig, credentials: Credentials) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            offset_ms: AtomicI64::new(0),
            clock: Arc::new(Timestamp::now),
        }
    }

    /// Replace the local clock (tests pin it).
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock_offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Local clock plus the current drift offset.
    pub fn server_now(&self) -> Timestamp {
        Timestamp::from_millis((self.clock)().as_millis() + self.clock_offset_ms())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // 2.1: one resync + one retry, and only for a timestamp rejection.
    // a second rejection is reported as a transport failure.
    pub fn signed_request(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ClientError> {
        match self.send_signed(path, params) {
            Err(ClientError::ClockSkew(message)) => {
                warn!(path, %message, "timestamp rejected, resyncing clock");
                self.resync_clock()?;
                match self.send_signed(path, params) {
                    Err(ClientError::ClockSkew(message)) => Err(ClientError::Transport(format!(
                        "timestamp still rejected after resync: {message}"
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    pub fn public_request(&self, path: &str) -> Result<Value, ClientError> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path));
        self.execute(&request)
    }

    // 2.2: offset = server time - midpoint of the local round trip.
    pub fn resync_clock(&self) -> Result<i64, ClientError> {
        let sent = (self.clock)().as_millis();
        let body = self.public_request(SERVER_TIME_PATH)?;
        let received = (self.clock)().as_millis();
        let server_ms = body
            .get("serverTime")
            .and_then(parse_i64)
            .ok_or_else(|| ClientError::Protocol("serverTime missing from time response".to_string()))?;
        let midpoint = sent + (received - sent) / 2;
        let offset = server_ms - midpoint;
        let previous = self.offset_ms.swap(offset, Ordering::SeqCst);
        info!(previous_offset_ms = previous, offset_ms = offset, "clock resynced");
        Ok(offset)
    }

    fn send_signed(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ClientError> {
        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.push(("timestamp".to_string(), self.server_now().as_millis().to_string()));
        query.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        query.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical = canonical_query(&query);
        let signature = sign_query(&self.credentials.api_secret, &canonical)?;
        let request = HttpRequest::get(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, canonical, signature
        ))
        .with_header(API_KEY_HEADER, &self.credentials.api_key);
        debug!(path, "signed request");
        self.execute(&request)
    }

    fn execute(&self, request: &HttpRequest) -> Result<Value, ClientError> {
        let reply = self.transport.get(request)?;
        if !reply.is_success() {
            return Err(ClientError::from_status(reply.status, &reply.body));
        }
        serde_json::from_str(&reply.body)
            .map_err(|err| ClientError::Protocol(format!("invalid json: {err}")))
    }
}
