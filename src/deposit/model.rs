//! Deposit record.
//!
//! Fields are private to the `deposit` module. Everything outside it reads
//! through accessors and changes state only through the guarded transitions
//! in [`super::machine`].

use super::checksum::ChecksumAlgorithm;
use crate::journal::JournalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Internal deposit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositId(pub Uuid);

impl DepositId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DepositId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositState {
    Received,
    Validated,
    Packaged,
    Transferred,
    Acknowledged,
    Failed,
}

impl DepositState {
    /// Position in the pipeline. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            DepositState::Received => 0,
            DepositState::Validated => 1,
            DepositState::Packaged => 2,
            DepositState::Transferred => 3,
            DepositState::Acknowledged | DepositState::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositState::Acknowledged | DepositState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositState::Received => "received",
            DepositState::Validated => "validated",
            DepositState::Packaged => "packaged",
            DepositState::Transferred => "transferred",
            DepositState::Acknowledged => "acknowledged",
            DepositState::Failed => "failed",
        }
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepositState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "received" => Ok(DepositState::Received),
            "validated" => Ok(DepositState::Validated),
            "packaged" => Ok(DepositState::Packaged),
            "transferred" => Ok(DepositState::Transferred),
            "acknowledged" => Ok(DepositState::Acknowledged),
            "failed" => Ok(DepositState::Failed),
            other => Err(format!("Unknown deposit state: {}", other)),
        }
    }
}

/// Deposit action as declared by the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositAction {
    Add,
    Edit,
}

impl FromStr for DepositAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(DepositAction::Add),
            "edit" => Ok(DepositAction::Edit),
            other => Err(format!("Unknown deposit action: {}", other)),
        }
    }
}

/// Pipeline step an error or log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    Validate,
    Package,
    RecordChecksum,
    Transfer,
    DownstreamStatus,
    Retry,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Validate => "validate",
            Transition::Package => "package",
            Transition::RecordChecksum => "record-checksum",
            Transition::Transfer => "transfer",
            Transition::DownstreamStatus => "downstream-status",
            Transition::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// Structured error log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub transition: Transition,
    pub state: DepositState,
    pub message: String,
}

/// One line of the processing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

/// Ingestion payload for a new deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeposit {
    pub journal: JournalId,
    pub deposit_uuid: String,
    pub file_type: String,
    pub action: DepositAction,
    pub volume: u32,
    pub issue: u32,
    pub pub_date: Option<Date>,
    pub checksum_type: Option<String>,
    pub checksum_value: Option<String>,
    pub url: Option<String>,
    pub size: Option<u64>,
    pub license: BTreeMap<String, String>,
}

/// Package artifact fields, set from the packaging stage onwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub path: Option<PathBuf>,
    pub size: Option<u64>,
    pub checksum_type: Option<ChecksumAlgorithm>,
    pub checksum_value: Option<String>,
}

/// One content submission tracked through the processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub(super) id: DepositId,
    pub(super) journal: JournalId,
    pub(super) deposit_uuid: String,
    pub(super) file_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(super) received: OffsetDateTime,
    pub(super) action: DepositAction,
    pub(super) volume: u32,
    pub(super) issue: u32,
    pub(super) pub_date: Option<Date>,
    pub(super) checksum_type: Option<String>,
    pub(super) checksum_value: Option<String>,
    pub(super) url: Option<String>,
    pub(super) size: Option<u64>,
    pub(super) license: BTreeMap<String, String>,
    pub(super) state: DepositState,
    pub(super) halted: bool,
    pub(super) error_log: Vec<ErrorLogEntry>,
    pub(super) pln_state: Option<String>,
    pub(super) package: PackageInfo,
    #[serde(with = "time::serde::rfc3339::option")]
    pub(super) deposit_date: Option<OffsetDateTime>,
    pub(super) deposit_receipt: Option<String>,
    #[serde(default)]
    pub(super) comment: Option<String>,
    pub(super) processing_log: Vec<ProcessingLogEntry>,
    pub(super) revision: u64,
}

impl Deposit {
    /// Create a deposit in the initial `received` state.
    ///
    /// The receipt timestamp is assigned here; identifier and checksum value
    /// are stored upper-cased.
    pub fn receive(new: NewDeposit, now: OffsetDateTime) -> Self {
        let mut deposit = Self {
            id: DepositId::generate(),
            journal: new.journal,
            deposit_uuid: new.deposit_uuid.trim().to_ascii_uppercase(),
            file_type: new.file_type,
            received: now,
            action: new.action,
            volume: new.volume,
            issue: new.issue,
            pub_date: new.pub_date,
            checksum_type: new.checksum_type,
            checksum_value: new.checksum_value.map(|v| v.trim().to_ascii_uppercase()),
            url: new.url,
            size: new.size,
            license: new.license,
            state: DepositState::Received,
            halted: false,
            error_log: Vec::new(),
            pln_state: None,
            package: PackageInfo::default(),
            deposit_date: None,
            deposit_receipt: None,
            comment: None,
            processing_log: Vec::new(),
            revision: 0,
        };
        deposit.log(now, "Deposit received from journal.".to_string());
        deposit
    }

    pub fn id(&self) -> DepositId {
        self.id
    }

    pub fn journal(&self) -> JournalId {
        self.journal
    }

    pub fn deposit_uuid(&self) -> &str {
        &self.deposit_uuid
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn received(&self) -> OffsetDateTime {
        self.received
    }

    pub fn action(&self) -> DepositAction {
        self.action
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn issue(&self) -> u32 {
        self.issue
    }

    pub fn pub_date(&self) -> Option<Date> {
        self.pub_date
    }

    pub fn checksum_type(&self) -> Option<&str> {
        self.checksum_type.as_deref()
    }

    pub fn checksum_value(&self) -> Option<&str> {
        self.checksum_value.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn license(&self) -> &BTreeMap<String, String> {
        &self.license
    }

    pub fn state(&self) -> DepositState {
        self.state
    }

    /// Whether automatic progression is stopped pending operator retry.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn error_log(&self) -> &[ErrorLogEntry] {
        &self.error_log
    }

    pub fn error_count(&self) -> usize {
        self.error_log.len()
    }

    /// Last status reported by the preservation network.
    pub fn pln_state(&self) -> Option<&str> {
        self.pln_state.as_deref()
    }

    pub fn package_info(&self) -> &PackageInfo {
        &self.package
    }

    /// Date the deposit was sent to the preservation network.
    pub fn deposit_date(&self) -> Option<OffsetDateTime> {
        self.deposit_date
    }

    pub fn deposit_receipt(&self) -> Option<&str> {
        self.deposit_receipt.as_deref()
    }

    /// Operator note, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn processing_log(&self) -> &[ProcessingLogEntry] {
        &self.processing_log
    }

    /// Processing history rendered as text, one timestamped block per entry.
    pub fn processing_log_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.processing_log {
            let stamp = entry
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| entry.timestamp.unix_timestamp().to_string());
            out.push_str(&format!("{}\n{}\n\n", stamp, entry.message));
        }
        out
    }

    /// Optimistic-concurrency revision, bumped by the store on every update.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Whether any of the searchable fields contain `needle` (case-insensitive).
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            Some(self.deposit_uuid.as_str()),
            self.url.as_deref(),
            self.checksum_value.as_deref(),
            self.pln_state.as_deref(),
            Some(self.file_type.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    pub(super) fn log(&mut self, now: OffsetDateTime, message: String) {
        self.processing_log.push(ProcessingLogEntry {
            timestamp: now,
            message,
        });
    }
}

impl fmt::Display for Deposit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.deposit_uuid)
    }
}
