//! Deposit lifecycle.
//!
//! - `model`: the deposit record and its append-only logs
//! - `machine`: guarded forward transitions and operator retry
//! - `checksum`: accepted algorithms, source/package checksum validation
//! - `ledger`: transitions applied against the store, one record write each

pub mod checksum;
pub mod ledger;
pub mod machine;
pub mod model;

#[cfg(test)]
mod proptests;

pub use checksum::{ChecksumAlgorithm, ChecksumError, ChecksumPolicy};
pub use ledger::{DepositLedger, LedgerError};
pub use machine::{package_extension, DepositError, DownstreamStatus};
pub use model::{
    Deposit, DepositAction, DepositId, DepositState, ErrorLogEntry, NewDeposit, PackageInfo,
    ProcessingLogEntry, Transition,
};
