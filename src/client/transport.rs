//! HTTP transport seam.
//!
//! The request layer only needs "GET this URL with these headers". Production uses a
//! blocking reqwest client with an explicit timeout; tests script replies per path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Url;

use super::ClientError;

const USER_AGENT: &str = concat!("funding-monitor/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn path(&self) -> Option<String> {
        Url::parse(&self.url).ok().map(|url| url.path().to_string())
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        let value = url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned());
        value
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can perform a GET. Must carry its own timeout.
pub trait Transport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> Result<HttpReply, ClientError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn get(&self, request: &HttpRequest) -> Result<HttpReply, ClientError> {
        (**self).get(request)
    }
}

/// Blocking reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ClientError::Transport(format!("http client init: {err}")))?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpReply, ClientError> {
        let mut builder = self.http.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder
            .send()
            .map_err(|err| ClientError::Transport(format!("rest_error: {err}")))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|err| ClientError::Transport(format!("body read failed: {err}")))?;
        Ok(HttpReply { status, body })
    }
}

/// Mock transport for testing. replies are queued per URL path and consumed in order.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<HttpReply, ClientError>>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, path: &str, status: u16, body: impl Into<String>) {
        self.push(
            path,
            Ok(HttpReply {
                status,
                body: body.into(),
            }),
        );
    }

    pub fn push_ok(&self, path: &str, body: impl Into<String>) {
        self.push_reply(path, 200, body);
    }

    pub fn push_error(&self, path: &str, err: ClientError) {
        self.push(path, Err(err));
    }

    fn push(&self, path: &str, reply: Result<HttpReply, ClientError>) {
        let mut replies = self.replies.lock().unwrap_or_else(|p| p.into_inner());
        replies.entry(path.to_string()).or_default().push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.path().as_deref() == Some(path))
            .collect()
    }

    pub fn pending(&self, path: &str) -> usize {
        let replies = self.replies.lock().unwrap_or_else(|p| p.into_inner());
        replies.get(path).map_or(0, VecDeque::len)
    }
}

impl Transport for MockTransport {
    fn get(&self, request: &HttpRequest) -> Result<HttpReply, ClientError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        let path = request
            .path()
            .ok_or_else(|| ClientError::Protocol(format!("bad url {}", request.url)))?;
        let mut replies = self.replies.lock().unwrap_or_else(|p| p.into_inner());
        replies
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ClientError::Transport(format!("no scripted reply for {path}"))))
    }
}
