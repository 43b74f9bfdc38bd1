//! Gatekeeper module: journal admission.
//!
//! - Version: dotted-numeric release ordering
//! - Probe: PLN gateway ping, one bounded request per journal
//! - Whitelist: allow/deny lists keyed by journal uuid, CAS promotion
//! - Sweep: periodic probe -> policy -> auditable decision
//! - Journals: operator actions on a single journal
//! - Audit trail: append-only record of admission decisions

pub mod audit_trail;
pub mod journals;
pub mod mock;
pub mod probe;
pub mod sweep;
pub mod version;
pub mod whitelist;

#[cfg(test)]
mod proptests;

pub use audit_trail::{AuditAction, AuditEntry, AuditQuery};
pub use journals::{JournalError, ReprobeOutcome};
pub use probe::{HealthProbe, HttpTransport, PingProbe, PingTransport, ProbeError, ProbeResult};
pub use sweep::{
    Decision, DecisionKind, JournalTrustController, SweepError, SweepOptions, SweepSettings,
    SweepSummary,
};
pub use version::{compare, Version, VersionError};
pub use whitelist::{GateError, WhitelistGate};
