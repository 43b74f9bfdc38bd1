//! Deposit state machine.
//!
//! ```text
//! received -> validated -> packaged -> transferred -> acknowledged
//!                                                  \-> failed
//! ```
//!
//! Rules:
//! - Transitions only move forward, one stage at a time. Validation is
//!   never skipped.
//! - A failed guard appends a structured entry to the error log and a line
//!   to the processing log, and halts the deposit until an operator retries.
//! - Downstream status updates are only accepted from `transferred` onwards.
//!   Earlier updates are logged and rejected; the state is left untouched.
//! - `retry` is the only backwards move and is operator-driven.
//! - Neither log is ever truncated.

use super::checksum::{ChecksumError, ChecksumPolicy};
use super::model::{Deposit, DepositState, ErrorLogEntry, PackageInfo, Transition};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Deposit transition errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepositError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    #[error("Unsupported file type: {0:?}")]
    UnsupportedFileType(String),

    #[error("Cannot {transition} a deposit in state {from}")]
    InvalidTransition {
        from: DepositState,
        transition: Transition,
    },

    #[error("Out-of-order downstream status {status:?} for deposit in state {state}")]
    Consistency { state: DepositState, status: String },

    #[error("Deposit is halted in state {0} pending operator retry")]
    Halted(DepositState),

    #[error("Cannot retry from {from} to {to}")]
    RetryNotAllowed { from: DepositState, to: DepositState },
}

/// Status reported by the preservation network for a transferred deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamStatus {
    /// Content is held by the network.
    Acknowledged,
    /// The network rejected or lost the deposit.
    Failed,
    /// Anything else (in progress, syncing, ...). Recorded but not terminal.
    Pending(String),
}

impl DownstreamStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "agreement" | "acknowledged" | "complete" | "completed" => {
                DownstreamStatus::Acknowledged
            }
            "failed" | "rejected" | "error" => DownstreamStatus::Failed,
            other => DownstreamStatus::Pending(other.to_string()),
        }
    }
}

/// Package extension for a declared file type.
pub fn package_extension(file_type: &str) -> Result<&'static str, DepositError> {
    match file_type.trim().to_ascii_lowercase().as_str() {
        "application/zip" | "zip" => Ok(".zip"),
        "application/x-gzip" | "application/gzip" | "gzip" => Ok(".tgz"),
        _ => Err(DepositError::UnsupportedFileType(file_type.to_string())),
    }
}

impl Deposit {
    /// Deterministic package file name: upper-cased deposit uuid plus the
    /// extension for the declared file type.
    pub fn package_name(&self) -> Result<String, DepositError> {
        let extension = package_extension(&self.file_type)?;
        Ok(format!("{}{}", self.deposit_uuid.to_ascii_uppercase(), extension))
    }

    /// `received -> validated`.
    ///
    /// Requires the source checksum type, value, url and size, and a checksum
    /// algorithm in the accepted set. When `payload` is given, the harvested
    /// file must match the declared size and checksum.
    pub fn validate(
        &mut self,
        policy: &ChecksumPolicy,
        payload: Option<&Path>,
        now: OffsetDateTime,
    ) -> Result<(), DepositError> {
        self.expect_state(DepositState::Received, Transition::Validate, now)?;

        if let Err(err) = self.check_source(policy, payload) {
            return Err(self.reject(Transition::Validate, err, true, now));
        }

        self.state = DepositState::Validated;
        let line = match payload {
            Some(path) => format!(
                "Validated source checksum against harvested file {}.",
                path.display()
            ),
            None => "Validated deposit metadata.".to_string(),
        };
        self.log(now, line);
        Ok(())
    }

    /// `validated -> packaged`.
    ///
    /// Resolves the package name from the declared file type and records the
    /// package path under `staging_dir`. Returns that path.
    pub fn package(
        &mut self,
        staging_dir: &Path,
        now: OffsetDateTime,
    ) -> Result<PathBuf, DepositError> {
        self.expect_state(DepositState::Validated, Transition::Package, now)?;

        let name = match self.package_name() {
            Ok(name) => name,
            Err(err) => return Err(self.reject(Transition::Package, err, true, now)),
        };
        let path = staging_dir.join(name);

        self.package.path = Some(path.clone());
        self.package.size = None;
        self.package.checksum_type = None;
        self.package.checksum_value = None;
        self.state = DepositState::Packaged;
        self.log(now, format!("Packaged deposit as {}.", path.display()));
        Ok(path)
    }

    /// Record the checksum and size of the built package (state stays
    /// `packaged`).
    pub fn record_package_checksum(
        &mut self,
        policy: &ChecksumPolicy,
        checksum_type: &str,
        checksum_value: &str,
        size: u64,
        now: OffsetDateTime,
    ) -> Result<(), DepositError> {
        self.expect_state(DepositState::Packaged, Transition::RecordChecksum, now)?;

        let (algorithm, value) = match policy.validate(checksum_type, checksum_value) {
            Ok(validated) => validated,
            Err(err) => {
                return Err(self.reject(Transition::RecordChecksum, err.into(), true, now))
            }
        };

        self.package.checksum_type = Some(algorithm);
        self.package.checksum_value = Some(value.clone());
        self.package.size = Some(size);
        self.log(
            now,
            format!("Package checksum {} {} ({} bytes).", algorithm, value, size),
        );
        Ok(())
    }

    /// Record that the built package could not be digested. Halts the
    /// deposit and returns the error that was logged.
    pub fn package_unreadable(&mut self, err: ChecksumError, now: OffsetDateTime) -> DepositError {
        if let Err(guard) = self.expect_state(DepositState::Packaged, Transition::RecordChecksum, now)
        {
            return guard;
        }
        self.reject(Transition::RecordChecksum, err.into(), true, now)
    }

    /// `packaged -> transferred`.
    ///
    /// Requires the package checksum and size. Sets the transfer date.
    pub fn transfer(
        &mut self,
        receipt: Option<String>,
        now: OffsetDateTime,
    ) -> Result<(), DepositError> {
        self.expect_state(DepositState::Packaged, Transition::Transfer, now)?;

        let missing = if self.package.checksum_type.is_none() {
            Some("package checksum type")
        } else if self.package.checksum_value.is_none() {
            Some("package checksum value")
        } else if self.package.size.is_none() {
            Some("package size")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(self.reject(
                Transition::Transfer,
                DepositError::MissingField(field),
                true,
                now,
            ));
        }

        self.state = DepositState::Transferred;
        self.deposit_date = Some(now);
        let line = match &receipt {
            Some(receipt) => format!("Transferred to preservation network. Receipt: {}", receipt),
            None => "Transferred to preservation network.".to_string(),
        };
        self.deposit_receipt = receipt;
        self.log(now, line);
        Ok(())
    }

    /// Apply a status reported by the preservation network.
    ///
    /// Rejected with [`DepositError::Consistency`] before `transferred`. Once
    /// terminal, later reports are recorded but do not move the state.
    pub fn apply_downstream_status(
        &mut self,
        status: &str,
        now: OffsetDateTime,
    ) -> Result<DepositState, DepositError> {
        if self.state.rank() < DepositState::Transferred.rank() {
            let err = DepositError::Consistency {
                state: self.state,
                status: status.to_string(),
            };
            return Err(self.reject(Transition::DownstreamStatus, err, false, now));
        }

        self.pln_state = Some(status.to_string());

        if self.state.is_terminal() {
            self.log(
                now,
                format!(
                    "Preservation network reported {:?}; deposit already {}.",
                    status, self.state
                ),
            );
            return Ok(self.state);
        }

        match DownstreamStatus::parse(status) {
            DownstreamStatus::Acknowledged => {
                self.state = DepositState::Acknowledged;
                self.log(now, format!("Preservation network acknowledged deposit ({}).", status));
            }
            DownstreamStatus::Failed => {
                self.state = DepositState::Failed;
                self.log(now, format!("Preservation network failed deposit ({}).", status));
            }
            DownstreamStatus::Pending(_) => {
                self.log(now, format!("Preservation network status: {}.", status));
            }
        }

        Ok(self.state)
    }

    /// Operator-driven retry.
    ///
    /// Allowed from a halted deposit or from `failed`, to a non-terminal state
    /// no later than the current one. Clears the halt and any package or
    /// transfer fields belonging to later stages. Logs are kept. A non-empty
    /// note becomes the deposit comment.
    pub fn retry(
        &mut self,
        target: DepositState,
        note: &str,
        now: OffsetDateTime,
    ) -> Result<(), DepositError> {
        let eligible = self.halted || self.state == DepositState::Failed;
        if !eligible || target.is_terminal() || target.rank() > self.state.rank() {
            let err = DepositError::RetryNotAllowed {
                from: self.state,
                to: target,
            };
            return Err(self.reject(Transition::Retry, err, false, now));
        }

        let from = self.state;
        self.state = target;
        self.halted = false;
        if target.rank() < DepositState::Packaged.rank() {
            self.package = PackageInfo::default();
        }
        if target.rank() < DepositState::Transferred.rank() {
            self.deposit_date = None;
            self.deposit_receipt = None;
        }
        if !note.is_empty() {
            self.comment = Some(note.to_string());
        }
        let line = if note.is_empty() {
            format!("Operator retry: {} -> {}.", from, target)
        } else {
            format!("Operator retry: {} -> {}. {}", from, target, note)
        };
        self.log(now, line);
        Ok(())
    }

    fn check_source(
        &self,
        policy: &ChecksumPolicy,
        payload: Option<&Path>,
    ) -> Result<(), DepositError> {
        let checksum_type = self
            .checksum_type
            .as_deref()
            .ok_or(DepositError::MissingField("checksum type"))?;
        let checksum_value = self
            .checksum_value
            .as_deref()
            .ok_or(DepositError::MissingField("checksum value"))?;
        if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(DepositError::MissingField("url"));
        }
        let size = self.size.ok_or(DepositError::MissingField("size"))?;

        policy.validate(checksum_type, checksum_value)?;

        if let Some(path) = payload {
            policy.verify_file(checksum_type, checksum_value, Some(size), path)?;
        }

        Ok(())
    }

    /// Guard on the source state. Halted deposits refuse every automatic
    /// transition without touching the logs.
    fn expect_state(
        &mut self,
        expected: DepositState,
        transition: Transition,
        now: OffsetDateTime,
    ) -> Result<(), DepositError> {
        if self.halted {
            return Err(DepositError::Halted(self.state));
        }
        if self.state != expected {
            let err = DepositError::InvalidTransition {
                from: self.state,
                transition,
            };
            return Err(self.reject(transition, err, false, now));
        }
        Ok(())
    }

    fn reject(
        &mut self,
        transition: Transition,
        err: DepositError,
        halt: bool,
        now: OffsetDateTime,
    ) -> DepositError {
        self.error_log.push(ErrorLogEntry {
            timestamp: now,
            transition,
            state: self.state,
            message: err.to_string(),
        });
        self.log(now, format!("{} failed: {}", transition, err));
        if halt {
            self.halted = true;
        }
        err
    }
}
