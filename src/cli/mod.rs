use clap::{Parser, Subcommand};
use self::config::{LoggingConfig, StagingConfig};
use pln_staging::deposit::DepositState;
use pln_staging::journal::JournalStatus;
use pln_staging::store::SqliteStore;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub mod audit;
pub mod config;
pub mod deposits;
pub mod init;
pub mod journal;
pub mod probe;
pub mod sweep;
pub mod version;

#[derive(Parser)]
#[command(name = "pln-staging")]
#[command(author = "PLN Staging Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Admission control and deposit staging for PLN journals", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/pln-staging/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Data directory for the database and staged packages
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Ping every journal and whitelist healthy ones running a recent release
    Sweep {
        /// Minimum release to whitelist (default from config)
        min_version: Option<String>,

        /// Report decisions without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Also ping journals already on the whitelist or blacklist
        #[arg(long)]
        all: bool,
    },

    /// Ping one journal now and record the outcome
    Probe {
        /// Journal id or uuid
        journal: String,

        /// Fail on the first network error instead of retrying
        #[arg(long)]
        no_retry: bool,
    },

    /// Manage journal records
    Journal {
        #[command(subcommand)]
        action: JournalCommands,
    },

    /// Blacklist a journal, or take it off both lists with --remove
    Blacklist {
        /// Journal id or uuid
        journal: String,

        /// Reason recorded on the blacklist entry
        #[arg(long, default_value = "")]
        comment: String,

        /// Remove the journal from the whitelist and blacklist
        #[arg(long, conflicts_with = "comment")]
        remove: bool,
    },

    /// List deposits
    Deposits {
        /// Only deposits from this journal (id or uuid)
        #[arg(long)]
        journal: Option<String>,

        /// Only deposits in this state
        #[arg(long)]
        state: Option<DepositState>,

        /// Only deposits with a non-empty error log
        #[arg(long)]
        errors: bool,

        /// Substring search over uuid, url, checksum, status and file type
        #[arg(long)]
        search: Option<String>,
    },

    /// Inspect or act on one deposit
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },

    /// Show the admission audit trail
    Audit {
        /// Only entries for this journal uuid
        #[arg(long)]
        journal: Option<String>,

        /// Only this action (e.g. promoted, sweep-decision, blacklisted)
        #[arg(long)]
        action: Option<String>,

        /// Maximum entries to show, most recent first
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum JournalCommands {
    /// Register a journal
    Add {
        /// Journal uuid as reported by its PLN plugin
        uuid: String,

        /// Journal base url
        url: String,
    },

    /// Show one journal
    Show {
        /// Journal id or uuid
        journal: String,
    },

    /// Set a journal's status (unknown, new, healthy, down, unreachable, ping-error)
    Status {
        /// Journal id or uuid
        journal: String,

        status: JournalStatus,
    },

    /// Delete a journal that has no deposits
    Delete {
        /// Journal id or uuid
        journal: String,
    },

    /// Search journals by uuid, url or title (all journals without a query)
    Search { query: Option<String> },
}

#[derive(Subcommand)]
pub enum DepositCommands {
    /// Show one deposit
    Show {
        /// Deposit id or uuid
        deposit: String,

        /// Include the full processing log
        #[arg(long)]
        log: bool,
    },

    /// Apply a status reported by the preservation network
    Status {
        /// Deposit id or uuid
        deposit: String,

        status: String,
    },

    /// Send a deposit back to an earlier state and clear its halt
    Retry {
        /// Deposit id or uuid
        deposit: String,

        /// State to resume from
        #[arg(long, default_value = "received")]
        to: DepositState,

        /// Note recorded in the processing log
        #[arg(long, default_value = "")]
        note: String,
    },
}

/// Configuration and store shared by every command that touches state.
pub struct Context {
    pub config: StagingConfig,
    pub store: Arc<SqliteStore>,
}

impl Context {
    /// Load configuration, start logging and open the store.
    pub async fn open(config_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = config_path.unwrap_or_else(config::default_config_path);
        if !path.exists() {
            return Err(format!(
                "Config file not found: {} (run `pln-staging init` first)",
                path.display()
            )
            .into());
        }

        let config = StagingConfig::load(&path)?;
        init_logging(&config.logging)?;

        let store = SqliteStore::open(&config.store.path).await?;
        tracing::debug!(store = %config.store.path.display(), "store opened");

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Output goes to stderr unless a log file is configured.
pub fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .map_err(|e| format!("Invalid log level {:?}: {}", logging.level, e))?,
    };

    // try_init: a subscriber may already be installed (tests).
    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create log directory: {}", e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.config;
    match cli.command {
        Commands::Init { data_dir, force } => init::execute(config, data_dir, force),
        Commands::Sweep {
            min_version,
            dry_run,
            all,
        } => sweep::execute(config, min_version, dry_run, all).await,
        Commands::Probe { journal, no_retry } => probe::execute(config, journal, no_retry).await,
        Commands::Journal { action } => journal::execute(config, action).await,
        Commands::Blacklist {
            journal,
            comment,
            remove,
        } => journal::blacklist(config, journal, comment, remove).await,
        Commands::Deposits {
            journal,
            state,
            errors,
            search,
        } => deposits::list(config, journal, state, errors, search).await,
        Commands::Deposit { action } => deposits::execute(config, action).await,
        Commands::Audit {
            journal,
            action,
            limit,
        } => audit::execute(config, journal, action, limit).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_sweep_defaults() {
        let cli = Cli::parse_from(["pln-staging", "sweep"]);

        assert_eq!(cli.config, None);
        match cli.command {
            Commands::Sweep {
                min_version,
                dry_run,
                all,
            } => {
                assert_eq!(min_version, None);
                assert!(!dry_run);
                assert!(!all);
            }
            _ => panic!("Expected Sweep command"),
        }
    }

    #[test]
    fn test_cli_parse_sweep_with_all_options() {
        let cli = Cli::parse_from([
            "pln-staging",
            "sweep",
            "3.2.1",
            "--dry-run",
            "--all",
            "--config",
            "/etc/pln/config.toml",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("/etc/pln/config.toml")));
        match cli.command {
            Commands::Sweep {
                min_version,
                dry_run,
                all,
            } => {
                assert_eq!(min_version, Some("3.2.1".to_string()));
                assert!(dry_run);
                assert!(all);
            }
            _ => panic!("Expected Sweep command"),
        }
    }

    #[test]
    fn test_cli_parse_probe() {
        let cli = Cli::parse_from(["pln-staging", "probe", "ABC-123"]);

        match cli.command {
            Commands::Probe { journal, no_retry } => {
                assert_eq!(journal, "ABC-123");
                assert!(!no_retry);
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_cli_parse_journal_add() {
        let cli = Cli::parse_from([
            "pln-staging",
            "journal",
            "add",
            "abc-123",
            "http://journal.example.org",
        ]);

        match cli.command {
            Commands::Journal {
                action: JournalCommands::Add { uuid, url },
            } => {
                assert_eq!(uuid, "abc-123");
                assert_eq!(url, "http://journal.example.org");
            }
            _ => panic!("Expected Journal Add command"),
        }
    }

    #[test]
    fn test_cli_parse_journal_status() {
        let cli = Cli::parse_from(["pln-staging", "journal", "status", "ABC", "ping-error"]);

        match cli.command {
            Commands::Journal {
                action: JournalCommands::Status { journal, status },
            } => {
                assert_eq!(journal, "ABC");
                assert_eq!(status, JournalStatus::PingError);
            }
            _ => panic!("Expected Journal Status command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_journal_status() {
        let result = Cli::try_parse_from(["pln-staging", "journal", "status", "ABC", "sleepy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_journal_search_without_query() {
        let cli = Cli::parse_from(["pln-staging", "journal", "search"]);

        match cli.command {
            Commands::Journal {
                action: JournalCommands::Search { query },
            } => assert_eq!(query, None),
            _ => panic!("Expected Journal Search command"),
        }
    }

    #[test]
    fn test_cli_parse_blacklist() {
        let cli = Cli::parse_from(["pln-staging", "blacklist", "ABC", "--comment", "spam"]);

        match cli.command {
            Commands::Blacklist {
                journal,
                comment,
                remove,
            } => {
                assert_eq!(journal, "ABC");
                assert_eq!(comment, "spam");
                assert!(!remove);
            }
            _ => panic!("Expected Blacklist command"),
        }
    }

    #[test]
    fn test_cli_blacklist_remove_conflicts_with_comment() {
        let result = Cli::try_parse_from([
            "pln-staging",
            "blacklist",
            "ABC",
            "--remove",
            "--comment",
            "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_deposits_filters() {
        let cli = Cli::parse_from([
            "pln-staging",
            "deposits",
            "--journal",
            "ABC",
            "--state",
            "packaged",
            "--errors",
        ]);

        match cli.command {
            Commands::Deposits {
                journal,
                state,
                errors,
                search,
            } => {
                assert_eq!(journal, Some("ABC".to_string()));
                assert_eq!(state, Some(DepositState::Packaged));
                assert!(errors);
                assert_eq!(search, None);
            }
            _ => panic!("Expected Deposits command"),
        }
    }

    #[test]
    fn test_cli_parse_deposit_retry_defaults() {
        let cli = Cli::parse_from(["pln-staging", "deposit", "retry", "DEP-1"]);

        match cli.command {
            Commands::Deposit {
                action: DepositCommands::Retry { deposit, to, note },
            } => {
                assert_eq!(deposit, "DEP-1");
                assert_eq!(to, DepositState::Received);
                assert_eq!(note, "");
            }
            _ => panic!("Expected Deposit Retry command"),
        }
    }

    #[test]
    fn test_cli_parse_deposit_status() {
        let cli = Cli::parse_from(["pln-staging", "deposit", "status", "DEP-1", "agreement"]);

        match cli.command {
            Commands::Deposit {
                action: DepositCommands::Status { deposit, status },
            } => {
                assert_eq!(deposit, "DEP-1");
                assert_eq!(status, "agreement");
            }
            _ => panic!("Expected Deposit Status command"),
        }
    }

    #[test]
    fn test_cli_parse_audit() {
        let cli = Cli::parse_from(["pln-staging", "audit", "--action", "promoted"]);

        match cli.command {
            Commands::Audit {
                journal,
                action,
                limit,
            } => {
                assert_eq!(journal, None);
                assert_eq!(action, Some("promoted".to_string()));
                assert_eq!(limit, 50); // default
            }
            _ => panic!("Expected Audit command"),
        }
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["pln-staging", "init", "--data-dir", "/srv/pln", "--force"]);

        match cli.command {
            Commands::Init { data_dir, force } => {
                assert_eq!(data_dir, Some(PathBuf::from("/srv/pln")));
                assert!(force);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["pln-staging", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
