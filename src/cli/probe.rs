use super::config::StagingConfig;
use super::Context;
use pln_staging::gatekeeper::journals::{reprobe, ReprobeOutcome};
use pln_staging::gatekeeper::{HttpTransport, PingProbe};
use pln_staging::retry::RetryPolicy;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Build the HTTP ping probe from configuration.
pub fn build_probe(
    config: &StagingConfig,
) -> Result<PingProbe<HttpTransport>, Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(
        config.probe_timeout()?,
        &config.trust.user_agent,
        config.trust.max_body_bytes,
    )?;
    Ok(PingProbe::new(transport))
}

/// Ping one journal now and record the outcome
pub async fn execute(
    config_path: Option<PathBuf>,
    journal: String,
    no_retry: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(config_path).await?;
    let probe = build_probe(&ctx.config)?;
    let retry = if no_retry {
        RetryPolicy {
            max_retries: 0,
            ..ctx.config.retry_policy()?
        }
    } else {
        ctx.config.retry_policy()?
    };

    let outcome = reprobe(
        ctx.store.as_ref(),
        &probe,
        &journal,
        retry,
        OffsetDateTime::now_utc(),
    )
    .await?;

    match outcome {
        ReprobeOutcome::Healthy { version, title } => {
            println!("✅ {} is healthy", journal);
            println!("   Version: {}", version.as_deref().unwrap_or("(not reported)"));
            println!("   Title:   {}", title.as_deref().unwrap_or("(not reported)"));
        }
        ReprobeOutcome::Incomplete { status, error } => {
            println!("⚠️  {} answered HTTP {} {}", journal, status, error);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_build_probe_from_default_config() {
        let config = StagingConfig::new(Path::new("/tmp/pln"));
        assert!(build_probe(&config).is_ok());
    }

    #[test]
    fn test_build_probe_rejects_bad_timeout() {
        let mut config = StagingConfig::new(Path::new("/tmp/pln"));
        config.trust.probe_timeout = "whenever".to_string();
        assert!(build_probe(&config).is_err());
    }
}
