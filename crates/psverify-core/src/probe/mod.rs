//! Live endpoint probing of a Flask application.
//!
//! The application is started through a `ProcessLauncher`, polled until it
//! answers, then exercised with a fixed set of endpoint probes. Findings go
//! to the collector as Warnings (problems) or Info (successes); the probe
//! never records an Error.

pub mod http;
pub mod process;

use std::path::Path;
use std::thread;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::LiveProbeConfig;
use crate::diagnostics::Collector;
use crate::error::ProbeError;
use crate::rules::catalog::RuleId;

use self::http::{HttpClient, HttpReply, Method};
use self::process::{ProcessLauncher, ServerGuard};

/// Expected shape of a JSON reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// The field is present.
    Field(String),
    /// The field is present and equal to the value.
    FieldEquals(String, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointProbe {
    pub method: Method,
    pub path: String,
    pub payload: Option<Value>,
    pub expect: Expect,
    /// Whether a non-200 status is a problem on its own.
    pub require_ok: bool,
}

impl EndpointProbe {
    fn label(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }

    /// Problem description, or `None` when the reply matches.
    fn judge(&self, reply: &HttpReply) -> Option<String> {
        let label = self.label();
        if self.require_ok && reply.status != 200 {
            return Some(format!("{label} returned {}", reply.status));
        }
        let body = reply.body.as_ref();
        match &self.expect {
            Expect::Field(name) => match body.and_then(|b| b.get(name)) {
                Some(_) => None,
                None => Some(format!("{label} response missing '{name}' field")),
            },
            Expect::FieldEquals(name, want) => match body.and_then(|b| b.get(name)) {
                Some(got) if got == want => None,
                Some(got) => Some(format!("{label} expected '{name}' = {want}, got {got}")),
                None => Some(format!("{label} response missing '{name}' field")),
            },
        }
    }
}

pub fn default_probes() -> Vec<EndpointProbe> {
    vec![
        EndpointProbe {
            method: Method::Get,
            path: "/api/tools".into(),
            payload: None,
            expect: Expect::Field("tools".into()),
            require_ok: true,
        },
        EndpointProbe {
            method: Method::Post,
            path: "/api/run".into(),
            payload: Some(json!({"tool": "SystemInfo", "computer": "localhost"})),
            expect: Expect::Field("success".into()),
            require_ok: true,
        },
        // An unknown tool may legitimately come back as 4xx; only the body matters.
        EndpointProbe {
            method: Method::Post,
            path: "/api/run".into(),
            payload: Some(json!({"tool": "NonExistentTool", "computer": "localhost"})),
            expect: Expect::FieldEquals("success".into(), Value::Bool(false)),
            require_ok: false,
        },
    ]
}

/// How far a probe run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    LaunchFailed,
    NotReady,
    Probed { passed: usize, failed: usize },
}

pub struct LiveProbe<'a> {
    launcher: &'a dyn ProcessLauncher,
    client: &'a dyn HttpClient,
    config: &'a LiveProbeConfig,
    probes: Vec<EndpointProbe>,
}

impl<'a> LiveProbe<'a> {
    pub fn new(
        launcher: &'a dyn ProcessLauncher,
        client: &'a dyn HttpClient,
        config: &'a LiveProbeConfig,
    ) -> Self {
        Self {
            launcher,
            client,
            config,
            probes: default_probes(),
        }
    }

    pub fn with_probes(mut self, probes: Vec<EndpointProbe>) -> Self {
        self.probes = probes;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub fn run(&self, app: &Path, collector: &mut Collector) -> LiveOutcome {
        let id = Some(RuleId::LiveProbe);
        let mut args = self.config.args.clone();
        args.push(app.display().to_string());

        let handle = match self.launcher.launch(&self.config.program, &args) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "live probe launch failed");
                collector.warning("Could not start Flask server - skipping live endpoint tests", id);
                return LiveOutcome::LaunchFailed;
            }
        };
        let _guard = ServerGuard::new(handle, self.config.shutdown_timeout());

        if !self.wait_ready() {
            collector.warning(
                format!(
                    "Flask server not reachable at {} after {} attempts - skipping live endpoint tests",
                    self.config.base_url, self.config.attempts
                ),
                id,
            );
            return LiveOutcome::NotReady;
        }
        collector.info(format!("Server started on {}", self.config.base_url), id);

        let (mut passed, mut failed) = (0, 0);
        for probe in &self.probes {
            match self.send(probe) {
                Ok(reply) => match probe.judge(&reply) {
                    None => {
                        passed += 1;
                        collector.info(format!("{} responded as expected", probe.label()), id);
                    }
                    Some(problem) => {
                        failed += 1;
                        collector.warning(problem, id);
                    }
                },
                Err(e) => {
                    failed += 1;
                    collector.warning(format!("{} failed: {e}", probe.label()), id);
                }
            }
        }
        info!(passed, failed, "live probe finished");
        LiveOutcome::Probed { passed, failed }
    }

    fn wait_ready(&self) -> bool {
        let url = self.url(&self.config.ready_path);
        for attempt in 1..=self.config.attempts {
            // Any reply, whatever the status, means the server is up.
            if self.client.get(&url, self.config.ready_timeout()).is_ok() {
                return true;
            }
            if attempt < self.config.attempts {
                thread::sleep(self.config.interval());
            }
        }
        false
    }

    fn send(&self, probe: &EndpointProbe) -> Result<HttpReply, ProbeError> {
        let url = self.url(&probe.path);
        let timeout = self.config.request_timeout();
        match (probe.method, &probe.payload) {
            (Method::Get, _) => self.client.get(&url, timeout),
            (Method::Post, Some(payload)) => self.client.post_json(&url, payload, timeout),
            (Method::Post, None) => self.client.post_json(&url, &json!({}), timeout),
        }
    }
}
