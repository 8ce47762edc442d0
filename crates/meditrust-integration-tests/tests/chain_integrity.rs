//! Integration test: chain integrity, concurrency and expiry.
//!
//! Drives the ledger, registry and access crates directly, without the
//! engine, to check the audit and visibility rules at the component seams.

use std::convert::Infallible;
use std::sync::Arc;
use std::thread;

use serde_json::json;

use meditrust_access::{classify, ApprovalOracle};
use meditrust_ledger::chain::verify_blocks;
use meditrust_ledger::{Ledger, NewRecord};
use meditrust_registry::{Registration, Registry};
use meditrust_types::{AccessLevel, Block, Identity, Profile, SECONDS_PER_DAY};

const TEST_TIMESTAMP: u64 = 1_700_000_000;

fn no_persist<T>(_: &T) -> Result<(), Infallible> {
    Ok(())
}

fn identity(registry: &Registry, role: &str, patient_id: Option<&str>) -> Identity {
    registry
        .register(
            Registration {
                role: role.to_string(),
                profile: Profile {
                    name: format!("{role} user"),
                    age: 30,
                    id_number: "3171".to_string(),
                    address_text: "Bandung".to_string(),
                    phone: "0813".to_string(),
                },
                patient_id: patient_id.map(str::to_string),
                specialization: None,
                existing_private_key: None,
            },
            TEST_TIMESTAMP,
            no_persist,
        )
        .expect("register")
        .identity
}

fn append(ledger: &Ledger, creator: &Identity, level: AccessLevel, n: u64, expiry_years: Option<u32>) {
    ledger
        .append(
            NewRecord {
                creator,
                patient_id: "P001",
                data: json!({ "visit": n }),
                access_level: level,
                expiry_years,
            },
            TEST_TIMESTAMP,
            no_persist,
        )
        .expect("append");
}

fn owned(ledger: &Ledger) -> Vec<Block> {
    ledger.snapshot().iter().map(|b| Block::clone(b)).collect()
}

#[test]
fn untouched_chain_verifies() {
    let registry = Registry::new();
    let doctor = identity(&registry, "doctor", None);
    let ledger = Ledger::new(TEST_TIMESTAMP);
    for n in 0..5 {
        append(&ledger, &doctor, AccessLevel::Private, n, None);
    }

    let report = ledger.verify();
    assert!(report.valid);
    assert_eq!(report.total_blocks, 6);
    assert_eq!(report.first_invalid_index, None);
}

#[test]
fn flipped_payload_byte_is_located() {
    let registry = Registry::new();
    let nurse = identity(&registry, "nurse", None);
    let ledger = Ledger::new(TEST_TIMESTAMP);
    for n in 0..4 {
        append(&ledger, &nurse, AccessLevel::Public, n, None);
    }

    let mut blocks = owned(&ledger);
    blocks[3].data = json!({ "visit": 99 });
    let report = verify_blocks(&blocks);
    assert!(!report.valid);
    assert_eq!(report.first_invalid_index, Some(3));

    // A restored chain reports the same index.
    let restored = Ledger::from_blocks(blocks).expect("non-empty");
    assert_eq!(restored.verify().first_invalid_index, Some(3));
}

#[test]
fn broken_link_is_located() {
    let registry = Registry::new();
    let nurse = identity(&registry, "nurse", None);
    let ledger = Ledger::new(TEST_TIMESTAMP);
    for n in 0..3 {
        append(&ledger, &nurse, AccessLevel::Public, n, None);
    }

    let mut blocks = owned(&ledger);
    blocks[2].prev_hash[0] ^= 0xff;
    assert_eq!(verify_blocks(&blocks).first_invalid_index, Some(2));

    // Dropping a block breaks the link of its successor.
    let mut blocks = owned(&ledger);
    blocks.remove(1);
    assert_eq!(verify_blocks(&blocks).first_invalid_index, Some(1));
}

#[test]
fn concurrent_appends_form_one_chain() {
    const WRITERS: u64 = 8;
    const PER_WRITER: u64 = 25;

    let registry = Registry::new();
    let doctor = identity(&registry, "doctor", None);
    let ledger = Arc::new(Ledger::new(TEST_TIMESTAMP));

    thread::scope(|scope| {
        for w in 0..WRITERS {
            let ledger = Arc::clone(&ledger);
            let doctor = &doctor;
            scope.spawn(move || {
                for n in 0..PER_WRITER {
                    append(&ledger, doctor, AccessLevel::Private, w * PER_WRITER + n, None);
                }
            });
        }
    });

    let blocks = ledger.snapshot();
    assert_eq!(blocks.len() as u64, WRITERS * PER_WRITER + 1);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.index, i as u64);
    }
    assert!(ledger.verify().valid);

    // Every payload landed exactly once.
    let mut visits: Vec<u64> = blocks
        .iter()
        .skip(1)
        .map(|b| b.data["visit"].as_u64().expect("visit"))
        .collect();
    visits.sort_unstable();
    assert_eq!(visits, (0..WRITERS * PER_WRITER).collect::<Vec<_>>());
}

#[test]
fn one_year_record_expires_after_365_days() {
    let registry = Registry::new();
    let doctor = identity(&registry, "doctor", None);
    let patient = identity(&registry, "patient", Some("P001"));
    let ledger = Ledger::new(TEST_TIMESTAMP);
    append(&ledger, &doctor, AccessLevel::Public, 1, Some(1));

    let read = |reader: &Identity, now: u64| {
        let oracle: &dyn ApprovalOracle = &();
        classify(reader, "P001", ledger.blocks_for_patient("P001"), None, oracle, now)
            .expect("classify")
            .data
    };

    let day_360 = TEST_TIMESTAMP + 360 * SECONDS_PER_DAY;
    let view = read(&patient, day_360);
    assert_eq!(view.public.len(), 1);
    assert!(view.expired.is_empty());
    assert_eq!(ledger.expired_count(day_360), 0);

    let day_366 = TEST_TIMESTAMP + 366 * SECONDS_PER_DAY;
    let view = read(&patient, day_366);
    assert!(view.public.is_empty());
    assert_eq!(view.expired.len(), 1);
    assert!(view.expired[0].notice.starts_with("[EXPIRED"));
    assert_eq!(ledger.expired_count(day_366), 1);

    // Expiry is a view; the chain itself is unchanged.
    assert!(ledger.verify().valid);
}

#[test]
fn rejected_writes_leave_chain_untouched() {
    let registry = Registry::new();
    let nurse = identity(&registry, "nurse", None);
    let family = identity(&registry, "family", Some("P001"));
    let ledger = Ledger::new(TEST_TIMESTAMP);

    for (creator, level) in [(&nurse, AccessLevel::Private), (&family, AccessLevel::Public)] {
        let result = ledger.append(
            NewRecord {
                creator,
                patient_id: "P001",
                data: json!({ "note": "x" }),
                access_level: level,
                expiry_years: None,
            },
            TEST_TIMESTAMP,
            no_persist,
        );
        assert!(result.is_err());
    }

    let failed = ledger.append(
        NewRecord {
            creator: &nurse,
            patient_id: "P001",
            data: json!({ "note": "x" }),
            access_level: AccessLevel::Public,
            expiry_years: None,
        },
        TEST_TIMESTAMP,
        |_: &Block| Err("disk full"),
    );
    assert!(failed.is_err());
    assert_eq!(ledger.len(), 1);
}
