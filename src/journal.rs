//! Journals and admission list entries.
//!
//! A journal is identified two ways: an internal [`JournalId`] used by the
//! store, and the external `uuid` generated by the journal's PLN plugin. Only
//! the uuid is used as a whitelist/blacklist key, so list membership survives
//! a journal moving to a new URL.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Internal journal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JournalId(pub Uuid);

impl JournalId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JournalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JournalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Journal health status as shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalStatus {
    /// Never contacted.
    Unknown,
    /// Registered but not yet probed.
    New,
    /// Last probe succeeded.
    Healthy,
    /// Marked down by an operator.
    Down,
    /// Last probe failed at the network level.
    Unreachable,
    /// Last probe got a response, but not a usable one.
    PingError,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Unknown => "unknown",
            JournalStatus::New => "new",
            JournalStatus::Healthy => "healthy",
            JournalStatus::Down => "down",
            JournalStatus::Unreachable => "unreachable",
            JournalStatus::PingError => "ping-error",
        }
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JournalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(JournalStatus::Unknown),
            "new" => Ok(JournalStatus::New),
            "healthy" => Ok(JournalStatus::Healthy),
            "down" => Ok(JournalStatus::Down),
            "unreachable" => Ok(JournalStatus::Unreachable),
            "ping-error" | "ping_error" => Ok(JournalStatus::PingError),
            other => Err(format!("Unknown journal status: {}", other)),
        }
    }
}

/// A participating journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    id: JournalId,
    uuid: String,
    pub url: String,
    pub title: Option<String>,
    pub status: JournalStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub contacted: Option<OffsetDateTime>,
}

impl Journal {
    /// Create a journal record. The uuid is canonicalized to upper case and
    /// cannot be changed afterwards.
    pub fn new(uuid: &str, url: impl Into<String>) -> Self {
        Self {
            id: JournalId::generate(),
            uuid: canonical_uuid(uuid),
            url: url.into(),
            title: None,
            status: JournalStatus::New,
            contacted: None,
        }
    }

    pub fn id(&self) -> JournalId {
        self.id
    }

    /// Stable external identifier (the admission-list key).
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Record a successful contact.
    pub fn mark_contacted(&mut self, title: Option<String>, now: OffsetDateTime) {
        self.status = JournalStatus::Healthy;
        self.contacted = Some(now);
        if title.is_some() {
            self.title = title;
        }
    }

    /// Whether any of the searchable fields contain `needle` (case-insensitive).
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.uuid.to_lowercase().contains(&needle)
            || self.url.to_lowercase().contains(&needle)
            || self
                .title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle))
    }
}

/// Canonical form of an external identifier.
pub fn canonical_uuid(uuid: &str) -> String {
    uuid.trim().to_ascii_uppercase()
}

/// Which admission list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Whitelist => "whitelist",
            ListKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whitelist or blacklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub uuid: String,
    pub comment: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

impl ListEntry {
    pub fn new(uuid: &str, comment: impl Into<String>, created: OffsetDateTime) -> Self {
        Self {
            uuid: canonical_uuid(uuid),
            comment: comment.into(),
            created,
        }
    }
}
