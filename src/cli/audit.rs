use super::Context;
use pln_staging::gatekeeper::audit_trail::{format_audit_log, query_audit_log};
use pln_staging::gatekeeper::{AuditAction, AuditQuery};
use pln_staging::journal::canonical_uuid;
use pln_staging::store::AuditStore;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Show the admission audit trail, most recent first
pub async fn execute(
    config_path: Option<PathBuf>,
    journal: Option<String>,
    action: Option<String>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = AuditQuery {
        action: action.as_deref().map(parse_action).transpose()?,
        journal_uuid: journal.as_deref().map(canonical_uuid),
        limit: Some(limit),
        after: None,
    };

    let ctx = Context::open(config_path).await?;
    let entries = ctx.store.audit_entries().await?;
    let selected = query_audit_log(&entries, &query);

    println!("{}", format_audit_log(&selected, OffsetDateTime::now_utc()));
    Ok(())
}

fn parse_action(label: &str) -> Result<AuditAction, String> {
    match label.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "sweep-decision" | "sweep" => Ok(AuditAction::SweepDecision),
        "promoted" => Ok(AuditAction::Promoted),
        "blacklisted" => Ok(AuditAction::Blacklisted),
        "delisted" => Ok(AuditAction::Delisted),
        "status-changed" => Ok(AuditAction::StatusChanged),
        "reprobed" => Ok(AuditAction::Reprobed),
        "journal-deleted" => Ok(AuditAction::JournalDeleted),
        other => Err(format!("Unknown audit action: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("promoted").unwrap(), AuditAction::Promoted);
        assert_eq!(parse_action("Sweep_Decision").unwrap(), AuditAction::SweepDecision);
        assert_eq!(parse_action("sweep").unwrap(), AuditAction::SweepDecision);
        assert!(parse_action("vetoed").is_err());
    }
}
