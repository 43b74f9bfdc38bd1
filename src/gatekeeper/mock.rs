//! Mock probe and transport for testing.

use super::probe::{HealthProbe, PingTransport, ProbeError, ProbeResult, RawResponse, TransportError};
use crate::journal::{canonical_uuid, Journal};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Canned probe outcomes keyed by journal uuid. Unknown journals fail with a
/// network error.
#[derive(Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<MockProbeState>>,
}

#[derive(Default)]
struct MockProbeState {
    outcomes: HashMap<String, Result<ProbeResult, ProbeError>>,
    calls: Vec<String>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal answers 200 with a ping document carrying `version`.
    pub fn healthy(&self, uuid: &str, version: Option<&str>, title: Option<&str>) {
        self.set(
            uuid,
            Ok(ProbeResult {
                http_status: 200,
                error: None,
                version: version.map(str::to_string),
                plugin_release: Some("2.0.4.2".to_string()),
                journal_title: title.map(str::to_string),
                well_formed: true,
            }),
        );
    }

    /// Journal answers with a non-200 status.
    pub fn http_error(&self, uuid: &str, status: u16, reason: &str) {
        self.set(
            uuid,
            Ok(ProbeResult {
                http_status: status,
                error: Some(reason.to_string()),
                ..ProbeResult::default()
            }),
        );
    }

    pub fn fail(&self, uuid: &str, err: ProbeError) {
        self.set(uuid, Err(err));
    }

    pub fn set(&self, uuid: &str, outcome: Result<ProbeResult, ProbeError>) {
        let mut state = self.state.lock().unwrap();
        state.outcomes.insert(canonical_uuid(uuid), outcome);
    }

    /// Uuids probed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn probe(&self, journal: &Journal) -> Result<ProbeResult, ProbeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(journal.uuid().to_string());
        state
            .outcomes
            .get(journal.uuid())
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::Network("connection refused".to_string())))
    }
}

/// Canned HTTP responses keyed by url. Unknown urls fail at the network level.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

#[derive(Default)]
struct MockTransportState {
    responses: HashMap<String, RawResponse>,
    requests: Vec<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, reason: &str, body: &str) {
        self.respond_bytes(url, status, reason, body.as_bytes());
    }

    pub fn respond_bytes(&self, url: &str, status: u16, reason: &str, body: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.responses.insert(
            url.to_string(),
            RawResponse {
                status,
                reason: reason.to_string(),
                body: body.to_vec(),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl PingTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(url.to_string());
        state
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Request(format!("connection refused: {}", url)))
    }
}
