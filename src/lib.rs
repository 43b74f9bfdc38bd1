//! PLN staging service core
//!
//! Admission control and deposit lifecycle for journals depositing content
//! into a preservation network through a staging server.
//!
//! - Gatekeeper: version gate, journal health probe, whitelist/blacklist and
//!   the periodic trust sweep that promotes healthy journals
//! - Deposit: the validate -> package -> checksum -> transfer -> acknowledge
//!   state machine, with append-only error and processing logs
//! - Store: persistence seam with in-memory and SQLite implementations
//!
//! Clocks, stores and probes are always passed in, never reached for.

pub mod deposit;
pub mod gatekeeper;
pub mod journal;
pub mod retry;
pub mod store;
