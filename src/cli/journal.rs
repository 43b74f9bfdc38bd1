use super::{Context, JournalCommands};
use pln_staging::gatekeeper::journals::{
    blacklist_journal, delete_journal, delist_journal, register_journal, resolve_journal,
    update_status,
};
use pln_staging::gatekeeper::WhitelistGate;
use pln_staging::journal::Journal;
use pln_staging::store::{DepositStore, JournalStore};
use std::path::PathBuf;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub async fn execute(
    config_path: Option<PathBuf>,
    action: JournalCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let store = ctx.store.as_ref();

    match action {
        JournalCommands::Add { uuid, url } => {
            let journal = register_journal(store, &uuid, &url).await?;
            println!("✅ Registered journal {}", journal.uuid());
            println!("   Id:  {}", journal.id());
            println!("   URL: {}", journal.url);
        }
        JournalCommands::Show { journal } => {
            let journal = resolve_journal(store, &journal).await?;
            let gate = WhitelistGate::new(Arc::clone(&ctx.store));
            let listing = gate.listing(journal.uuid()).await?;
            let deposits = store.count_deposits(journal.id()).await?;

            println!("{}", describe(&journal));
            println!(
                "  Listed:    {}",
                listing.map(|kind| kind.to_string()).unwrap_or_else(|| "no".to_string())
            );
            println!("  Deposits:  {}", deposits);
        }
        JournalCommands::Status { journal, status } => {
            let journal =
                update_status(store, &journal, status, OffsetDateTime::now_utc()).await?;
            println!("✅ {} is now {}", journal.uuid(), journal.status);
        }
        JournalCommands::Delete { journal } => {
            let journal = delete_journal(&ctx.store, &journal, OffsetDateTime::now_utc()).await?;
            println!("🗑️  Deleted journal {} ({})", journal.uuid(), journal.url);
        }
        JournalCommands::Search { query } => {
            let journals = match query {
                Some(query) => store.search_journals(&query).await?,
                None => store.list_journals().await?,
            };
            if journals.is_empty() {
                println!("No journals found.");
            }
            for journal in &journals {
                println!(
                    "{}  {:<11}  {}  {}",
                    journal.uuid(),
                    journal.status,
                    journal.url,
                    journal.title.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

/// Blacklist a journal, or delist it with `remove`
pub async fn blacklist(
    config_path: Option<PathBuf>,
    journal: String,
    comment: String,
    remove: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let now = OffsetDateTime::now_utc();

    if remove {
        let removed = delist_journal(&ctx.store, &journal, now).await?;
        if removed == 0 {
            println!("{} was not on any list", journal);
        } else {
            println!("✅ Removed {} from the admission lists", journal);
        }
        return Ok(());
    }

    let entry = blacklist_journal(&ctx.store, &journal, &comment, now).await?;
    println!("⛔ Blacklisted {}", entry.uuid);
    Ok(())
}

fn describe(journal: &Journal) -> String {
    let contacted = journal
        .contacted
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "Journal {}\n  Id:        {}\n  URL:       {}\n  Title:     {}\n  Status:    {}\n  Contacted: {}",
        journal.uuid(),
        journal.id(),
        journal.url,
        journal.title.as_deref().unwrap_or("(unknown)"),
        journal.status,
        contacted
    )
}
