//! Property-based tests for the deposit state machine
//!
//! Tests for:
//! - Log monotonicity: no operation sequence ever shrinks either log
//! - Forward-only progress: the state only moves back through retry
//! - Canonical identifiers: uuid and checksum value stay upper-cased

use super::checksum::ChecksumPolicy;
use super::machine::DepositError;
use super::model::{Deposit, DepositAction, DepositState, NewDeposit};
use crate::journal::JournalId;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const START: OffsetDateTime = datetime!(2026-01-01 00:00 UTC);

#[derive(Debug, Clone)]
enum Op {
    Validate,
    Package,
    RecordChecksum { valid: bool },
    Transfer,
    Status(&'static str),
    Retry(DepositState),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Validate),
        Just(Op::Package),
        any::<bool>().prop_map(|valid| Op::RecordChecksum { valid }),
        Just(Op::Transfer),
        prop::sample::select(vec!["agreement", "failed", "inProgress", "syncing"]).prop_map(Op::Status),
        prop::sample::select(vec![
            DepositState::Received,
            DepositState::Validated,
            DepositState::Packaged,
            DepositState::Transferred,
            DepositState::Acknowledged,
        ])
        .prop_map(Op::Retry),
    ]
}

fn deposit(uuid: String, file_type: &str, with_url: bool) -> Deposit {
    Deposit::receive(
        NewDeposit {
            journal: JournalId::generate(),
            deposit_uuid: uuid,
            file_type: file_type.to_string(),
            action: DepositAction::Add,
            volume: 1,
            issue: 1,
            pub_date: None,
            checksum_type: Some("sha1".to_string()),
            checksum_value: Some(SHA1.to_string()),
            url: with_url.then(|| "http://journal.example.org/d".to_string()),
            size: Some(11),
            license: BTreeMap::new(),
        },
        START,
    )
}

fn apply(deposit: &mut Deposit, op: &Op, policy: &ChecksumPolicy, now: OffsetDateTime) -> Result<(), DepositError> {
    match op {
        Op::Validate => deposit.validate(policy, None, now),
        Op::Package => deposit.package(Path::new("/staging"), now).map(|_| ()),
        Op::RecordChecksum { valid } => {
            let value = if *valid { SHA1 } else { "not-hex" };
            deposit.record_package_checksum(policy, "sha1", value, 4096, now)
        }
        Op::Transfer => deposit.transfer(None, now),
        Op::Status(status) => deposit.apply_downstream_status(status, now).map(|_| ()),
        Op::Retry(target) => deposit.retry(*target, "", now),
    }
}

proptest! {
    /// Property: Logs are append-only under any operation sequence
    #[test]
    fn logs_never_shrink(
        ops in prop::collection::vec(op(), 0..40),
        file_type in prop::sample::select(vec!["zip", "application/x-gzip", "text/plain"]),
        with_url in any::<bool>(),
    ) {
        let policy = ChecksumPolicy::default();
        let mut deposit = deposit("abc-123".to_string(), file_type, with_url);

        for (i, op) in ops.iter().enumerate() {
            let now = START + Duration::minutes(i as i64 + 1);
            let errors_before = deposit.error_log().to_vec();
            let log_before = deposit.processing_log().to_vec();

            let _ = apply(&mut deposit, op, &policy, now);

            prop_assert!(deposit.error_log().len() >= errors_before.len());
            prop_assert!(deposit.processing_log().len() >= log_before.len());
            prop_assert_eq!(&deposit.error_log()[..errors_before.len()], &errors_before[..]);
            prop_assert_eq!(&deposit.processing_log()[..log_before.len()], &log_before[..]);
        }
    }

    /// Property: Without a successful retry the state never moves backwards,
    /// and forward moves are one stage at a time
    #[test]
    fn state_moves_forward_only(ops in prop::collection::vec(op(), 0..40)) {
        let policy = ChecksumPolicy::default();
        let mut deposit = deposit("abc-123".to_string(), "zip", true);

        for (i, op) in ops.iter().enumerate() {
            let now = START + Duration::minutes(i as i64 + 1);
            let before = deposit.state();
            let outcome = apply(&mut deposit, op, &policy, now);
            let after = deposit.state();

            match (op, &outcome) {
                (Op::Retry(_), Ok(())) => prop_assert!(after.rank() <= before.rank()),
                (_, Err(_)) => prop_assert_eq!(after, before),
                _ => {
                    prop_assert!(after.rank() >= before.rank());
                    prop_assert!(after.rank() <= before.rank() + 1);
                }
            }
            if before.is_terminal() && !matches!(op, Op::Retry(_)) {
                prop_assert_eq!(after, before);
            }
        }
    }

    /// Property: Identifiers are stored upper-cased
    #[test]
    fn identifiers_are_canonical(uuid in "[a-f0-9\\-]{1,36}") {
        let deposit = deposit(uuid.clone(), "zip", true);
        prop_assert_eq!(deposit.deposit_uuid(), uuid.to_ascii_uppercase());
        let checksum = SHA1.to_ascii_uppercase();
        prop_assert_eq!(deposit.checksum_value(), Some(checksum.as_str()));
    }
}
