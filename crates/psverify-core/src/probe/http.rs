//! Minimal HTTP surface used by the live probe.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Status plus the body when it parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Option<Value>,
}

pub trait HttpClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, ProbeError>;

    fn post_json(&self, url: &str, payload: &Value, timeout: Duration) -> Result<HttpReply, ProbeError>;
}

pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn finish(
        url: &str,
        sent: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<HttpReply, ProbeError> {
        let resp = sent.map_err(|e| ProbeError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().ok();
        Ok(HttpReply { status, body })
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, ProbeError> {
        Self::finish(url, self.client.get(url).timeout(timeout).send())
    }

    fn post_json(&self, url: &str, payload: &Value, timeout: Duration) -> Result<HttpReply, ProbeError> {
        Self::finish(url, self.client.post(url).json(payload).timeout(timeout).send())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed on any sane test host.
        let err = ReqwestClient::new()
            .get("http://127.0.0.1:9/api/tools", Duration::from_millis(500))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport { .. }));
    }
}
