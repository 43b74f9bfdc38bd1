use super::{Context, DepositCommands};
use pln_staging::deposit::{Deposit, DepositLedger, DepositState};
use pln_staging::gatekeeper::journals::resolve_journal;
use pln_staging::store::DepositStore;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// List deposits matching every given filter
pub async fn list(
    config_path: Option<PathBuf>,
    journal: Option<String>,
    state: Option<DepositState>,
    errors: bool,
    search: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let store = ctx.store.as_ref();

    let mut deposits = match &journal {
        Some(key) => {
            let journal = resolve_journal(store, key).await?;
            store.deposits_for_journal(journal.id()).await?
        }
        None => match state {
            Some(state) => store.deposits_in_state(state).await?,
            None => store.search_deposits(search.as_deref().unwrap_or("")).await?,
        },
    };
    retain_matching(&mut deposits, state, errors, search.as_deref());

    if deposits.is_empty() {
        println!("No deposits found.");
        return Ok(());
    }
    for deposit in &deposits {
        println!("{}", summary_line(deposit));
    }
    println!();
    println!("{} deposit(s)", deposits.len());
    Ok(())
}

pub async fn execute(
    config_path: Option<PathBuf>,
    action: DepositCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let ledger = DepositLedger::new(
        ctx.store.clone(),
        ctx.config.checksum_policy()?,
        ctx.config.deposits.staging_dir.clone(),
    );
    let now = OffsetDateTime::now_utc();

    match action {
        DepositCommands::Show { deposit, log } => {
            let deposit = ledger.resolve(&deposit).await?;
            println!("{}", describe(&deposit));
            if log {
                println!();
                println!("Processing log:");
                print!("{}", deposit.processing_log_text());
            }
        }
        DepositCommands::Status { deposit, status } => {
            let id = ledger.resolve(&deposit).await?.id();
            let deposit = ledger.apply_downstream_status(id, &status, now).await?;
            println!(
                "✅ {} is {} (network status: {})",
                deposit,
                deposit.state(),
                deposit.pln_state().unwrap_or("none")
            );
        }
        DepositCommands::Retry { deposit, to, note } => {
            let id = ledger.resolve(&deposit).await?.id();
            let deposit = ledger.retry(id, to, &note, now).await?;
            println!("🔁 {} will resume from {}", deposit, deposit.state());
        }
    }
    Ok(())
}

fn retain_matching(
    deposits: &mut Vec<Deposit>,
    state: Option<DepositState>,
    errors: bool,
    search: Option<&str>,
) {
    deposits.retain(|d| {
        state.map_or(true, |s| d.state() == s)
            && (!errors || d.error_count() > 0)
            && search.map_or(true, |q| d.matches(q))
    });
}

fn summary_line(deposit: &Deposit) -> String {
    format!(
        "{}  {:<12}{}  errors={}  received={}",
        deposit.deposit_uuid(),
        deposit.state(),
        if deposit.is_halted() { " (halted)" } else { "" },
        deposit.error_count(),
        format_time(deposit.received())
    )
}

fn describe(deposit: &Deposit) -> String {
    let mut out = format!("Deposit {}\n", deposit.deposit_uuid());
    out.push_str(&format!("  Id:        {}\n", deposit.id()));
    out.push_str(&format!("  Journal:   {}\n", deposit.journal()));
    out.push_str(&format!(
        "  State:     {}{}\n",
        deposit.state(),
        if deposit.is_halted() { " (halted)" } else { "" }
    ));
    out.push_str(&format!("  Received:  {}\n", format_time(deposit.received())));
    out.push_str(&format!(
        "  Issue:     vol. {} no. {}\n",
        deposit.volume(),
        deposit.issue()
    ));
    out.push_str(&format!("  File type: {}\n", deposit.file_type()));
    out.push_str(&format!("  URL:       {}\n", deposit.url().unwrap_or("-")));
    out.push_str(&format!(
        "  Checksum:  {} {}\n",
        deposit.checksum_type().unwrap_or("-"),
        deposit.checksum_value().unwrap_or("-")
    ));

    let package = deposit.package_info();
    if let Some(path) = &package.path {
        out.push_str(&format!("  Package:   {}\n", path.display()));
    }
    if let (Some(kind), Some(value)) = (&package.checksum_type, &package.checksum_value) {
        out.push_str(&format!("  Sealed:    {} {}\n", kind, value));
    }
    if let Some(date) = deposit.deposit_date() {
        out.push_str(&format!("  Deposited: {}\n", format_time(date)));
    }
    if let Some(status) = deposit.pln_state() {
        out.push_str(&format!("  Network:   {}\n", status));
    }
    if let Some(comment) = deposit.comment() {
        out.push_str(&format!("  Comment:   {}\n", comment));
    }

    if !deposit.error_log().is_empty() {
        out.push_str("  Errors:\n");
        for entry in deposit.error_log() {
            out.push_str(&format!(
                "    {} [{} in {}] {}\n",
                format_time(entry.timestamp),
                entry.transition,
                entry.state,
                entry.message
            ));
        }
    }
    out.trim_end().to_string()
}

fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| t.unix_timestamp().to_string())
}
