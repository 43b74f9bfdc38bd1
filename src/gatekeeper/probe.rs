//! Journal health probe.
//!
//! One bounded-timeout GET against the journal's PLN gateway ping endpoint:
//!
//! ```text
//! <journal url without trailing '/'>/gateway/plugin/PLNGatewayPlugin
//! ```
//!
//! Outcomes:
//! - transport failure (connect, timeout, body limit) -> [`ProbeError::Network`]
//! - non-200 response -> `Ok(ProbeResult)` with `well_formed = false`
//! - 200 with a body that is not a ping document -> [`ProbeError::Protocol`]
//! - 200 with a ping document -> `Ok(ProbeResult)`; `version` is `None` when
//!   the document carries no release token
//!
//! The probe never retries. Callers that want retries wrap it in
//! [`crate::retry::retry_with_backoff`].

use crate::journal::Journal;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;

/// Path of the ping endpoint, relative to the journal url.
pub const PING_PATH: &str = "gateway/plugin/PLNGatewayPlugin";

/// Root element of a ping document.
const PING_ROOT: &str = "plnplugin";

/// Default cap on a ping response body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Probe errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The request did not complete. Safe to retry.
    #[error("Network error: {0}")]
    Network(String),

    /// The journal answered 200 with something other than a ping document.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProbeError::Network(_))
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub http_status: u16,
    /// Reason phrase of a non-200 response.
    pub error: Option<String>,
    /// Release token reported by the journal software.
    pub version: Option<String>,
    pub plugin_release: Option<String>,
    pub journal_title: Option<String>,
    pub well_formed: bool,
}

impl ProbeResult {
    pub fn is_http_ok(&self) -> bool {
        self.http_status == 200
    }
}

/// Anything that can probe a journal.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, journal: &Journal) -> Result<ProbeResult, ProbeError>;
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// Raw HTTP response as seen by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

/// Bounded-timeout GET. Implementations must not retry.
#[async_trait]
pub trait PingTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpTransport {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        max_body_bytes: usize,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| TransportError::Request(format!("http client build failed: {}", e)))?;
        Ok(Self {
            client,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl PingTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if let Some(expected) = response.content_length() {
            if expected > self.max_body_bytes as u64 {
                return Err(TransportError::BodyTooLarge(self.max_body_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(TransportError::BodyTooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

/// Ping endpoint for a journal url.
pub fn ping_url(journal_url: &str) -> String {
    format!("{}/{}", journal_url.trim().trim_end_matches('/'), PING_PATH)
}

/// Fields of interest in a ping document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingDocument {
    pub ojs_release: Option<String>,
    pub plugin_release: Option<String>,
    pub journal_title: Option<String>,
}

/// Parse a ping document.
///
/// The document must be well-formed XML with a single `plnplugin` root.
/// Missing fields are `None`, empty fields too.
pub fn parse_ping_document(body: &str) -> Result<PingDocument, ProbeError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut doc = PingDocument::default();
    let mut path: Vec<String> = Vec::new();
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProbeError::Protocol(format!("malformed ping document: {}", e)))?;

        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                open_element(&mut path, &mut root_seen, name)?;
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                open_element(&mut path, &mut root_seen, name)?;
                path.pop();
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| ProbeError::Protocol(format!("malformed ping document: {}", e)))?;
                record_text(&mut doc, &path, &value)?;
            }
            Event::CData(data) => {
                let value = std::str::from_utf8(&data)
                    .map_err(|e| ProbeError::Protocol(format!("malformed ping document: {}", e)))?;
                record_text(&mut doc, &path, value)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(ProbeError::Protocol(format!(
            "ping document truncated inside <{}>",
            path.join("/")
        )));
    }
    if !root_seen {
        return Err(ProbeError::Protocol("empty ping document".to_string()));
    }

    Ok(doc)
}

fn open_element(
    path: &mut Vec<String>,
    root_seen: &mut bool,
    name: String,
) -> Result<(), ProbeError> {
    if path.is_empty() {
        if *root_seen {
            return Err(ProbeError::Protocol(
                "ping document has more than one root element".to_string(),
            ));
        }
        if name != PING_ROOT {
            return Err(ProbeError::Protocol(format!(
                "unexpected root element <{}>",
                name
            )));
        }
        *root_seen = true;
    }
    path.push(name);
    Ok(())
}

fn record_text(doc: &mut PingDocument, path: &[String], value: &str) -> Result<(), ProbeError> {
    if path.is_empty() {
        return Err(ProbeError::Protocol(
            "text outside the ping document root".to_string(),
        ));
    }

    let value = value.trim();
    if value.is_empty() {
        return Ok(());
    }

    let slot = match path {
        [_, section, field] if field == "release" && section == "ojsInfo" => &mut doc.ojs_release,
        [_, section, field] if field == "release" && section == "pluginInfo" => {
            &mut doc.plugin_release
        }
        [_, section, field] if field == "title" && section == "journalInfo" => {
            &mut doc.journal_title
        }
        _ => return Ok(()),
    };

    match slot {
        Some(existing) => existing.push_str(value),
        None => *slot = Some(value.to_string()),
    }
    Ok(())
}

/// Probe that speaks the PLN gateway ping protocol over a [`PingTransport`].
pub struct PingProbe<T: PingTransport> {
    transport: T,
}

impl<T: PingTransport> PingProbe<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: PingTransport> HealthProbe for PingProbe<T> {
    async fn probe(&self, journal: &Journal) -> Result<ProbeResult, ProbeError> {
        let url = ping_url(&journal.url);
        let response = self
            .transport
            .get(&url)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        if response.status != 200 {
            return Ok(ProbeResult {
                http_status: response.status,
                error: Some(response.reason),
                ..ProbeResult::default()
            });
        }

        let body = std::str::from_utf8(&response.body)
            .map_err(|e| ProbeError::Protocol(format!("ping body is not UTF-8: {}", e)))?;
        let doc = parse_ping_document(body)?;

        Ok(ProbeResult {
            http_status: response.status,
            error: None,
            version: doc.ojs_release,
            plugin_release: doc.plugin_release,
            journal_title: doc.journal_title,
            well_formed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::mock::MockTransport;

    const PING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plnplugin>
  <ojsInfo>
    <release>3.3.0.7</release>
  </ojsInfo>
  <pluginInfo>
    <release>2.0.4.2</release>
  </pluginInfo>
  <journalInfo>
    <title>Journal of Applied &amp; Theoretical Quokkas</title>
    <articles count="3" />
  </journalInfo>
</plnplugin>"#;

    #[test]
    fn test_ping_url() {
        assert_eq!(
            ping_url("http://j.example.org/index.php/jaq/"),
            "http://j.example.org/index.php/jaq/gateway/plugin/PLNGatewayPlugin"
        );
        assert_eq!(
            ping_url("http://j.example.org"),
            "http://j.example.org/gateway/plugin/PLNGatewayPlugin"
        );
    }

    #[test]
    fn test_parse_full_document() {
        let doc = parse_ping_document(PING).unwrap();
        assert_eq!(doc.ojs_release.as_deref(), Some("3.3.0.7"));
        assert_eq!(doc.plugin_release.as_deref(), Some("2.0.4.2"));
        assert_eq!(
            doc.journal_title.as_deref(),
            Some("Journal of Applied & Theoretical Quokkas")
        );
    }

    #[test]
    fn test_parse_without_release() {
        let doc = parse_ping_document("<plnplugin><ojsInfo/><journalInfo><title><![CDATA[T]]></title></journalInfo></plnplugin>").unwrap();
        assert_eq!(doc.ojs_release, None);
        assert_eq!(doc.journal_title.as_deref(), Some("T"));
    }

    #[test]
    fn test_parse_rejects_non_documents() {
        for body in [
            "",
            "<html><body>Not here</body></html>",
            "<plnplugin><ojsInfo><release>3.1</release></ojsInfo>",
            "<plnplugin></plnplugin><plnplugin></plnplugin>",
            "<plnplugin><ojsInfo></pluginInfo></plnplugin>",
            "just some text",
        ] {
            assert!(
                matches!(parse_ping_document(body), Err(ProbeError::Protocol(_))),
                "accepted {:?}",
                body
            );
        }
    }

    #[tokio::test]
    async fn test_probe_classifies_responses() {
        let transport = MockTransport::new();
        let ok = Journal::new("ok", "http://ok.example.org/");
        let gone = Journal::new("gone", "http://gone.example.org");
        let junk = Journal::new("junk", "http://junk.example.org");
        let down = Journal::new("down", "http://down.example.org");

        transport.respond(&ping_url(&ok.url), 200, "OK", PING);
        transport.respond(&ping_url(&gone.url), 404, "Not Found", "");
        transport.respond(&ping_url(&junk.url), 200, "OK", "<html></html>");
        // No canned response for `down`: the mock fails at the network level.

        let probe = PingProbe::new(transport.clone());

        let result = probe.probe(&ok).await.unwrap();
        assert!(result.well_formed);
        assert!(result.is_http_ok());
        assert_eq!(result.version.as_deref(), Some("3.3.0.7"));

        let result = probe.probe(&gone).await.unwrap();
        assert_eq!(result.http_status, 404);
        assert_eq!(result.error.as_deref(), Some("Not Found"));
        assert!(!result.well_formed);
        assert_eq!(result.version, None);

        assert!(matches!(
            probe.probe(&junk).await,
            Err(ProbeError::Protocol(_))
        ));
        let err = probe.probe(&down).await.unwrap_err();
        assert!(err.is_retryable());

        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_ping_body_must_be_utf8() {
        let transport = MockTransport::new();
        let journal = Journal::new("latin", "http://latin.example.org");
        let mut body = PING.as_bytes().to_vec();
        body.extend_from_slice(&[0xff, 0xfe]);
        transport.respond_bytes(&ping_url(&journal.url), 200, "OK", &body);

        let err = PingProbe::new(transport).probe(&journal).await.unwrap_err();
        assert!(matches!(err, ProbeError::Protocol(ref msg) if msg.contains("UTF-8")));
        assert!(!err.is_retryable());
    }
}
