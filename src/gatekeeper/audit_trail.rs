//! Admission audit trail.
//!
//! Every admission decision that touches persisted state leaves an entry:
//! sweep decisions, promotions, blacklisting, operator status changes,
//! re-probes and journal deletion.
//!
//! - Immutable, append-only (no deletion, no update)
//! - Keyed by the journal's external uuid, so entries outlive a deleted journal
//! - Chronological ordering via timestamp

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Admission action types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    /// One decision of a (non dry-run) trust sweep.
    SweepDecision,
    /// Journal added to the whitelist.
    Promoted,
    /// Journal added to the blacklist.
    Blacklisted,
    /// Journal removed from the admission lists.
    Delisted,
    /// Operator changed the journal status.
    StatusChanged,
    /// On-demand probe of a single journal.
    Reprobed,
    /// Journal record deleted.
    JournalDeleted,
    /// Other operator action.
    Other(String),
}

/// Single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// External uuid of the journal concerned.
    pub journal_uuid: String,
    pub action: AuditAction,
    /// Human-readable details.
    pub details: String,
}

impl AuditEntry {
    pub fn new(
        journal_uuid: &str,
        action: AuditAction,
        details: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            timestamp,
            journal_uuid: journal_uuid.to_string(),
            action,
            details: details.into(),
        }
    }

    /// Relative time for recent entries, RFC 3339 for old ones.
    pub fn relative_time(&self, now: OffsetDateTime) -> String {
        if now < self.timestamp {
            return self.absolute_time();
        }

        let elapsed = (now - self.timestamp).whole_seconds();
        match elapsed {
            0..=60 => "Just now".to_string(),
            61..=3600 => format!("{} min ago", elapsed / 60),
            3601..=86400 => format!("{} hours ago", elapsed / 3600),
            86401..=604800 => format!("{} days ago", elapsed / 86400),
            _ => self.absolute_time(),
        }
    }

    fn absolute_time(&self) -> String {
        self.timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string())
    }

    pub fn action_display(&self) -> String {
        match &self.action {
            AuditAction::SweepDecision => "Sweep Decision".to_string(),
            AuditAction::Promoted => "Promoted".to_string(),
            AuditAction::Blacklisted => "Blacklisted".to_string(),
            AuditAction::Delisted => "Delisted".to_string(),
            AuditAction::StatusChanged => "Status Changed".to_string(),
            AuditAction::Reprobed => "Re-probed".to_string(),
            AuditAction::JournalDeleted => "Journal Deleted".to_string(),
            AuditAction::Other(s) => s.clone(),
        }
    }
}

/// Query options for the audit log.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub journal_uuid: Option<String>,
    /// Limit number of results (most recent first).
    pub limit: Option<usize>,
    /// Only entries strictly after this instant.
    pub after: Option<OffsetDateTime>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action: None,
            journal_uuid: None,
            limit: Some(50),
            after: None,
        }
    }
}

/// Query the audit log. Returns entries most recent first.
pub fn query_audit_log(entries: &[AuditEntry], query: &AuditQuery) -> Vec<AuditEntry> {
    let mut filtered: Vec<AuditEntry> = entries
        .iter()
        .filter(|entry| {
            if let Some(ref action) = query.action {
                if &entry.action != action {
                    return false;
                }
            }

            if let Some(ref uuid) = query.journal_uuid {
                if !entry.journal_uuid.eq_ignore_ascii_case(uuid) {
                    return false;
                }
            }

            if let Some(after) = query.after {
                if entry.timestamp <= after {
                    return false;
                }
            }

            true
        })
        .cloned()
        .collect();

    // Stable sort keeps append order for equal timestamps.
    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}

/// Format audit entries for the operator console.
pub fn format_audit_log(entries: &[AuditEntry], now: OffsetDateTime) -> String {
    if entries.is_empty() {
        return "No audit entries found.".to_string();
    }

    let mut output = String::from("Admission Audit Trail\n\n");

    for entry in entries {
        output.push_str(&format!(
            "- {} | {} | {}\n  {}\n\n",
            entry.relative_time(now),
            entry.action_display(),
            entry.journal_uuid,
            entry.details
        ));
    }

    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2026-05-10 12:00 UTC);

    fn entry(uuid: &str, action: AuditAction, details: &str, age_secs: i64) -> AuditEntry {
        AuditEntry::new(uuid, action, details, NOW - Duration::seconds(age_secs))
    }

    #[test]
    fn test_filter_by_action() {
        let entries = vec![
            entry("A", AuditAction::Promoted, "p1", 30),
            entry("B", AuditAction::SweepDecision, "s1", 20),
            entry("C", AuditAction::Promoted, "p2", 10),
        ];

        let query = AuditQuery {
            action: Some(AuditAction::Promoted),
            ..Default::default()
        };

        let result = query_audit_log(&entries, &query);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|e| e.action == AuditAction::Promoted));
        // Most recent first.
        assert_eq!(result[0].details, "p2");
    }

    #[test]
    fn test_filter_by_journal_is_case_insensitive() {
        let entries = vec![
            entry("ABC", AuditAction::Promoted, "p", 30),
            entry("DEF", AuditAction::Promoted, "q", 20),
        ];

        let query = AuditQuery {
            journal_uuid: Some("abc".to_string()),
            ..Default::default()
        };

        let result = query_audit_log(&entries, &query);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].journal_uuid, "ABC");
    }

    #[test]
    fn test_after_and_limit() {
        let entries: Vec<AuditEntry> = (0..10)
            .map(|i| entry("A", AuditAction::SweepDecision, &format!("d{}", i), 100 - i * 10))
            .collect();

        let query = AuditQuery {
            after: Some(NOW - Duration::seconds(55)),
            limit: Some(3),
            ..Default::default()
        };

        let result = query_audit_log(&entries, &query);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|e| e.timestamp > NOW - Duration::seconds(55)));

        let unlimited = AuditQuery {
            limit: None,
            ..Default::default()
        };
        assert_eq!(query_audit_log(&entries, &unlimited).len(), 10);
    }

    #[test]
    fn test_relative_time() {
        assert_eq!(entry("A", AuditAction::Promoted, "", 5).relative_time(NOW), "Just now");
        assert_eq!(entry("A", AuditAction::Promoted, "", 120).relative_time(NOW), "2 min ago");
        assert_eq!(entry("A", AuditAction::Promoted, "", 7200).relative_time(NOW), "2 hours ago");
        assert_eq!(entry("A", AuditAction::Promoted, "", 172800).relative_time(NOW), "2 days ago");
        assert_eq!(
            entry("A", AuditAction::Promoted, "", 1_000_000).relative_time(NOW),
            "2026-04-28T22:13:20Z"
        );
        // Future timestamps (clock skew) are shown absolutely.
        assert!(entry("A", AuditAction::Promoted, "", -3600)
            .relative_time(NOW)
            .starts_with("2026-05-10T13:00"));
    }

    #[test]
    fn test_format_audit_log() {
        let entries = vec![
            entry("ABC", AuditAction::Promoted, "http://j.example.org whitelisted", 5),
            entry("ABC", AuditAction::Other("Imported".to_string()), "legacy list", 5),
        ];

        let formatted = format_audit_log(&entries, NOW);
        assert!(formatted.starts_with("Admission Audit Trail"));
        assert!(formatted.contains("Promoted | ABC"));
        assert!(formatted.contains("Imported"));
        assert!(formatted.contains("legacy list"));

        assert_eq!(format_audit_log(&[], NOW), "No audit entries found.");
    }
}
