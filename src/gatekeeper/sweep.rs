//! Journal trust sweep.
//!
//! Probes every known journal and promotes the ones running a recent enough
//! release to the whitelist. Each journal gets exactly one decision, the
//! first rule that matches:
//!
//! 1. whitelisted (unless `include_listed`) -> skipped
//! 2. blacklisted (unless `include_listed`) -> skipped
//! 3. probe failed at the network or protocol level -> network error
//! 4. non-200 answer -> http error
//! 5. no release token -> no version
//! 6. (contacted: logged and counted)
//! 7. release below the minimum -> below min
//! 8. dry run -> would promote
//! 9. listed in the meantime -> already listed, otherwise promoted
//!
//! Probes run concurrently (bounded, results consumed in journal order).
//! All writes happen in the consuming loop, one journal at a time. Per-journal
//! failures never abort the sweep; store failures do. A dry run writes
//! nothing.

use super::audit_trail::{AuditAction, AuditEntry};
use super::probe::{HealthProbe, ProbeError, ProbeResult};
use super::version::{Version, VersionError};
use super::whitelist::{GateError, WhitelistGate};
use crate::journal::{Journal, JournalId, JournalStatus, ListKind};
use crate::store::{Store, StoreError};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

/// Sweep errors. Only these abort a sweep.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SweepError {
    #[error("Invalid minimum version: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Controller-wide settings (from configuration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    pub default_min_version: String,
    /// Maximum probes in flight.
    pub concurrency: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            default_min_version: "3.1.2".to_string(),
            concurrency: 8,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// Overrides the configured minimum release.
    pub min_version: Option<String>,
    pub dry_run: bool,
    /// Probe journals that are already on a list.
    pub include_listed: bool,
}

/// What the sweep decided for one journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    SkippedWhitelisted,
    SkippedBlacklisted,
    NetworkError { cause: String },
    HttpError { status: u16, error: String },
    NoVersion { status: u16 },
    BelowMin { version: String },
    WouldPromote { version: String },
    AlreadyListedRace { version: String },
    Promoted { version: String },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::SkippedWhitelisted => DecisionKind::SkippedWhitelisted,
            Decision::SkippedBlacklisted => DecisionKind::SkippedBlacklisted,
            Decision::NetworkError { .. } => DecisionKind::NetworkError,
            Decision::HttpError { .. } => DecisionKind::HttpError,
            Decision::NoVersion { .. } => DecisionKind::NoVersion,
            Decision::BelowMin { .. } => DecisionKind::BelowMin,
            Decision::WouldPromote { .. } => DecisionKind::WouldPromote,
            Decision::AlreadyListedRace { .. } => DecisionKind::AlreadyListedRace,
            Decision::Promoted { .. } => DecisionKind::Promoted,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::SkippedWhitelisted => write!(f, "skipped: already whitelisted"),
            Decision::SkippedBlacklisted => write!(f, "skipped: blacklisted"),
            Decision::NetworkError { cause } => write!(f, "unreachable: {}", cause),
            Decision::HttpError { status, error } => write!(f, "HTTP {} {}", status, error),
            Decision::NoVersion { status } => write!(f, "HTTP {}, no version reported", status),
            Decision::BelowMin { version } => write!(f, "version {} below minimum", version),
            Decision::WouldPromote { version } => write!(f, "would promote (version {})", version),
            Decision::AlreadyListedRace { version } => {
                write!(f, "already listed (version {})", version)
            }
            Decision::Promoted { version } => write!(f, "promoted (version {})", version),
        }
    }
}

/// Decision without its payload, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecisionKind {
    SkippedWhitelisted,
    SkippedBlacklisted,
    NetworkError,
    HttpError,
    NoVersion,
    BelowMin,
    WouldPromote,
    AlreadyListedRace,
    Promoted,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::SkippedWhitelisted => "skipped-whitelisted",
            DecisionKind::SkippedBlacklisted => "skipped-blacklisted",
            DecisionKind::NetworkError => "network-error",
            DecisionKind::HttpError => "http-error",
            DecisionKind::NoVersion => "no-version",
            DecisionKind::BelowMin => "below-min",
            DecisionKind::WouldPromote => "would-promote",
            DecisionKind::AlreadyListedRace => "already-listed",
            DecisionKind::Promoted => "promoted",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal's line in the sweep summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalDecision {
    pub journal: JournalId,
    pub uuid: String,
    pub url: String,
    pub decision: Decision,
}

/// Result of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub total: usize,
    /// Journals that answered 200 with a usable release token.
    pub contacted: usize,
    pub counts: BTreeMap<DecisionKind, usize>,
    pub decisions: Vec<JournalDecision>,
}

impl SweepSummary {
    pub fn count(&self, kind: DecisionKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    fn record(&mut self, decision: JournalDecision) {
        *self.counts.entry(decision.decision.kind()).or_insert(0) += 1;
        self.total += 1;
        self.decisions.push(decision);
    }
}

/// Outcome of the concurrent stage for one journal.
enum Triage {
    Listed(ListKind),
    Probed(Result<ProbeResult, ProbeError>),
}

/// Drives the periodic trust sweep.
pub struct JournalTrustController<S: Store, P: HealthProbe> {
    store: Arc<S>,
    probe: Arc<P>,
    gate: WhitelistGate<S>,
    settings: SweepSettings,
}

impl<S: Store, P: HealthProbe> JournalTrustController<S, P> {
    pub fn new(store: Arc<S>, probe: Arc<P>, settings: SweepSettings) -> Self {
        let gate = WhitelistGate::new(Arc::clone(&store));
        Self {
            store,
            probe,
            gate,
            settings,
        }
    }

    /// Run one sweep over every known journal.
    pub async fn run_sweep(
        &self,
        options: SweepOptions,
        now: OffsetDateTime,
    ) -> Result<SweepSummary, SweepError> {
        let min_label = options
            .min_version
            .clone()
            .unwrap_or_else(|| self.settings.default_min_version.clone());
        let min_version = Version::parse(&min_label)?;

        let journals = self.store.list_journals().await?;
        info!(
            journals = journals.len(),
            min_version = %min_version,
            dry_run = options.dry_run,
            include_listed = options.include_listed,
            "starting trust sweep"
        );

        // The concurrent stage does network I/O only. It must not hold a
        // store connection while the loop below writes.
        let listings = if options.include_listed {
            BTreeMap::new()
        } else {
            self.listings().await?
        };
        let probe = &self.probe;
        let mut triaged = stream::iter(journals)
            .map(|journal| {
                let listed = listings.get(journal.uuid()).copied();
                async move {
                    let triage = match listed {
                        Some(list) => Triage::Listed(list),
                        None => Triage::Probed(probe.probe(&journal).await),
                    };
                    (journal, triage)
                }
            })
            .buffered(self.settings.concurrency.max(1));

        let mut summary = SweepSummary::default();
        while let Some((journal, triage)) = triaged.next().await {
            let decision = self
                .decide(journal, triage, &min_version, &options, now, &mut summary)
                .await?;
            summary.record(decision);
        }

        info!(
            total = summary.total,
            contacted = summary.contacted,
            promoted = summary.count(DecisionKind::Promoted),
            "trust sweep finished"
        );
        Ok(summary)
    }

    /// Current list membership of every listed journal, keyed by uuid.
    async fn listings(&self) -> Result<BTreeMap<String, ListKind>, StoreError> {
        let mut listings = BTreeMap::new();
        for kind in [ListKind::Blacklist, ListKind::Whitelist] {
            for entry in self.gate.entries(kind).await? {
                listings.insert(entry.uuid, kind);
            }
        }
        Ok(listings)
    }

    async fn decide(
        &self,
        mut journal: Journal,
        triage: Triage,
        min_version: &Version,
        options: &SweepOptions,
        now: OffsetDateTime,
        summary: &mut SweepSummary,
    ) -> Result<JournalDecision, SweepError> {
        let url = journal.url.clone();
        let uuid = journal.uuid().to_string();

        let result = match triage {
            Triage::Listed(ListKind::Whitelist) => {
                info!(journal = %url, uuid = %uuid, "skipped: already whitelisted");
                return Ok(self.finish(&journal, Decision::SkippedWhitelisted));
            }
            Triage::Listed(ListKind::Blacklist) => {
                info!(journal = %url, uuid = %uuid, "skipped: blacklisted");
                return Ok(self.finish(&journal, Decision::SkippedBlacklisted));
            }
            Triage::Probed(Err(err)) => {
                error!(journal = %url, uuid = %uuid, error = %err, "ping failed");
                let status = match err {
                    ProbeError::Network(_) => JournalStatus::Unreachable,
                    ProbeError::Protocol(_) => JournalStatus::PingError,
                };
                let decision = Decision::NetworkError {
                    cause: err.to_string(),
                };
                if !options.dry_run {
                    journal.status = status;
                    self.persist(&journal, &decision, now).await?;
                }
                return Ok(self.finish(&journal, decision));
            }
            Triage::Probed(Ok(result)) => result,
        };

        if !result.is_http_ok() {
            let error = result.error.clone().unwrap_or_default();
            error!(
                journal = %url,
                uuid = %uuid,
                status = result.http_status,
                error = %error,
                "ping returned an error"
            );
            let decision = Decision::HttpError {
                status: result.http_status,
                error,
            };
            if !options.dry_run {
                journal.status = JournalStatus::PingError;
                self.persist(&journal, &decision, now).await?;
            }
            return Ok(self.finish(&journal, decision));
        }

        if !options.dry_run {
            journal.mark_contacted(result.journal_title.clone(), now);
        }

        let reported = result.version.as_deref().and_then(|raw| {
            match Version::parse(raw) {
                Ok(version) => Some((raw.to_string(), version)),
                Err(err) => {
                    warn!(journal = %url, uuid = %uuid, error = %err, "unparseable version");
                    None
                }
            }
        });

        let (label, version) = match reported {
            Some(reported) => reported,
            None => {
                warn!(journal = %url, uuid = %uuid, status = result.http_status, "no version reported");
                let decision = Decision::NoVersion {
                    status: result.http_status,
                };
                if !options.dry_run {
                    self.persist(&journal, &decision, now).await?;
                }
                return Ok(self.finish(&journal, decision));
            }
        };

        summary.contacted += 1;
        info!(
            journal = %url,
            uuid = %uuid,
            status = result.http_status,
            version = %label,
            "contacted"
        );

        let decision = if version < *min_version {
            info!(journal = %url, uuid = %uuid, version = %label, min_version = %min_version, "below minimum version");
            Decision::BelowMin { version: label }
        } else if options.dry_run {
            info!(journal = %url, uuid = %uuid, version = %label, "would promote");
            Decision::WouldPromote { version: label }
        } else {
            self.promote(&journal, label, now).await?
        };

        if !options.dry_run {
            self.persist(&journal, &decision, now).await?;
        }
        Ok(self.finish(&journal, decision))
    }

    async fn promote(
        &self,
        journal: &Journal,
        version: String,
        now: OffsetDateTime,
    ) -> Result<Decision, SweepError> {
        let uuid = journal.uuid();

        if self.gate.listing(uuid).await?.is_some() {
            info!(journal = %journal.url, uuid = %uuid, "already listed");
            return Ok(Decision::AlreadyListedRace { version });
        }

        let comment = format!(
            "{} added automatically by ping-whitelist sweep.",
            journal.url
        );
        match self.gate.promote(uuid, &comment, now).await {
            Ok(_) => {
                info!(journal = %journal.url, uuid = %uuid, version = %version, "promoted to whitelist");
                Ok(Decision::Promoted { version })
            }
            Err(GateError::AlreadyListed { list, .. }) => {
                info!(journal = %journal.url, uuid = %uuid, list = %list, "lost promotion race");
                Ok(Decision::AlreadyListedRace { version })
            }
            Err(GateError::Store(err)) => Err(err.into()),
        }
    }

    /// Save the journal record and the decision's audit entry.
    async fn persist(
        &self,
        journal: &Journal,
        decision: &Decision,
        now: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.store.save_journal(journal).await?;

        let action = match decision {
            Decision::Promoted { .. } => AuditAction::Promoted,
            _ => AuditAction::SweepDecision,
        };
        let entry = AuditEntry::new(
            journal.uuid(),
            action,
            format!("{}: {}", journal.url, decision),
            now,
        );
        self.store.append_audit(&entry).await
    }

    fn finish(&self, journal: &Journal, decision: Decision) -> JournalDecision {
        JournalDecision {
            journal: journal.id(),
            uuid: journal.uuid().to_string(),
            url: journal.url.clone(),
            decision,
        }
    }
}

/// Render a summary for the operator console.
pub fn format_summary(summary: &SweepSummary, dry_run: bool) -> String {
    let mut out = String::new();
    for line in &summary.decisions {
        out.push_str(&format!("{} ({}): {}\n", line.url, line.uuid, line.decision));
    }

    out.push_str(&format!(
        "\n{} journals, {} contacted{}\n",
        summary.total,
        summary.contacted,
        if dry_run { " (dry run, nothing written)" } else { "" }
    ));
    for (kind, count) in &summary.counts {
        out.push_str(&format!("  {}: {}\n", kind, count));
    }
    out.trim_end().to_string()
}
