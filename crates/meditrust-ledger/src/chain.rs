//! The serialized chain, appends and audits.
//!
//! Appends take the write lock for the whole of index assignment, linkage,
//! persistence and push, so two appends can never observe the same tip.
//! Audits and patient scans take a snapshot of shared block pointers under
//! the read lock and work on it without holding the lock.

use std::borrow::Borrow;
use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use meditrust_types::{
    validate_patient_id, AccessLevel, Block, ChainReport, Identity, DEFAULT_EXPIRY_YEARS,
    GENESIS_PREV_HASH, MAX_EXPIRY_YEARS, MIN_EXPIRY_YEARS, SECONDS_PER_YEAR,
};

use crate::block::{self, UnsealedBlock};
use crate::{LedgerError, Result};

/// A record about to be appended.
#[derive(Clone, Debug)]
pub struct NewRecord<'a> {
    pub creator: &'a Identity,
    pub patient_id: &'a str,
    pub data: Value,
    pub access_level: AccessLevel,
    /// Lifetime in years. `None` uses the default.
    pub expiry_years: Option<u32>,
}

/// The hash-linked chain. Owns every block.
#[derive(Debug)]
pub struct Ledger {
    blocks: RwLock<Vec<Arc<Block>>>,
}

impl Ledger {
    /// Start a new chain with a genesis block stamped `now`.
    pub fn new(now: u64) -> Self {
        Self {
            blocks: RwLock::new(vec![Arc::new(block::genesis(now))]),
        }
    }

    /// Restore a persisted chain verbatim. Use [`Ledger::verify`] to audit it.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self> {
        if blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(Self {
            blocks: RwLock::new(blocks.into_iter().map(Arc::new).collect()),
        })
    }

    /// Append a record.
    ///
    /// `commit` runs under the write lock with the sealed block before it is
    /// pushed; if it fails the chain is left untouched.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidPatientId`] for a malformed subject
    /// - [`LedgerError::InvalidExpiry`] if the lifetime is outside 1..=30 years
    /// - [`LedgerError::InvalidPayload`] unless the data is a JSON object
    /// - [`LedgerError::Unauthorized`] if the creator may not write that tier
    /// - [`LedgerError::Persistence`] if `commit` fails
    pub fn append<F, E>(&self, record: NewRecord<'_>, now: u64, commit: F) -> Result<Arc<Block>>
    where
        F: FnOnce(&Block) -> std::result::Result<(), E>,
        E: Display,
    {
        validate_patient_id(record.patient_id)?;
        if !record.data.is_object() {
            return Err(LedgerError::InvalidPayload(
                "record data must be a JSON object".into(),
            ));
        }

        let years = record.expiry_years.unwrap_or(DEFAULT_EXPIRY_YEARS);
        if !(MIN_EXPIRY_YEARS..=MAX_EXPIRY_YEARS).contains(&years) {
            return Err(LedgerError::InvalidExpiry(years));
        }

        let creator = record.creator;
        if !meditrust_access::can_write(creator, record.access_level, record.patient_id) {
            tracing::warn!(
                creator = %creator.address,
                role = %creator.role,
                level = %record.access_level,
                patient_id = record.patient_id,
                "append rejected"
            );
            return Err(LedgerError::Unauthorized {
                role: creator.role,
                level: record.access_level,
                patient_id: record.patient_id.to_string(),
            });
        }

        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        let tip = blocks.last().ok_or(LedgerError::EmptyChain)?;

        let sealed = UnsealedBlock {
            index: tip.index + 1,
            timestamp: now,
            patient_id: record.patient_id.to_string(),
            data: record.data,
            access_level: record.access_level,
            created_by: creator.address.clone(),
            created_by_name: creator.profile.name.clone(),
            expiry_date: now + u64::from(years) * SECONDS_PER_YEAR,
            prev_hash: tip.hash,
        }
        .seal();

        commit(&sealed).map_err(|e| LedgerError::Persistence(e.to_string()))?;

        let sealed = Arc::new(sealed);
        blocks.push(Arc::clone(&sealed));

        tracing::info!(
            index = sealed.index,
            patient_id = %sealed.patient_id,
            level = %sealed.access_level,
            creator = %sealed.created_by,
            "block appended"
        );

        Ok(sealed)
    }

    /// Consistent view of the chain at this instant.
    pub fn snapshot(&self) -> Vec<Arc<Block>> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Audit the whole chain from genesis.
    pub fn verify(&self) -> ChainReport {
        let report = verify_blocks(&self.snapshot());
        if let Some(index) = report.first_invalid_index {
            tracing::warn!(index, total = report.total_blocks, "chain integrity violation");
        }
        report
    }

    /// Blocks about `patient_id`, oldest first.
    ///
    /// Works on a snapshot: appends made while iterating are not observed.
    pub fn blocks_for_patient<'a>(
        &self,
        patient_id: &'a str,
    ) -> impl Iterator<Item = Arc<Block>> + 'a {
        self.snapshot()
            .into_iter()
            .filter(move |b| !b.is_genesis() && b.patient_id == patient_id)
    }

    /// Number of non-genesis blocks past their expiry date.
    pub fn expired_count(&self, now: u64) -> usize {
        self.snapshot()
            .iter()
            .filter(|b| !b.is_genesis() && b.is_expired(now))
            .count()
    }

    pub fn tip(&self) -> Option<Arc<Block>> {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Audit a sequence of blocks: each hash must recompute, each block must sit
/// at its own index, and each `prev_hash` must equal its predecessor's hash.
pub fn verify_blocks<B: Borrow<Block>>(blocks: &[B]) -> ChainReport {
    let total_blocks = blocks.len() as u64;
    let mut prev_hash = GENESIS_PREV_HASH;

    for (position, entry) in blocks.iter().enumerate() {
        let current: &Block = entry.borrow();
        let position = position as u64;
        if current.index != position
            || current.prev_hash != prev_hash
            || !block::hash_matches(current)
        {
            return ChainReport {
                valid: false,
                total_blocks,
                first_invalid_index: Some(position),
            };
        }
        prev_hash = current.hash;
    }

    ChainReport {
        valid: total_blocks > 0,
        total_blocks,
        first_invalid_index: None,
    }
}

/// Turn a failed report into an error.
pub fn ensure_valid(report: &ChainReport) -> Result<()> {
    match report.first_invalid_index {
        Some(index) => Err(LedgerError::IntegrityViolation { index }),
        None if report.valid => Ok(()),
        None => Err(LedgerError::EmptyChain),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use meditrust_types::{Profile, Role, SECONDS_PER_DAY};
    use serde_json::json;

    fn ok(_: &Block) -> std::result::Result<(), Infallible> {
        Ok(())
    }

    fn staff(role: Role) -> Identity {
        Identity {
            address: format!("mt-{role}"),
            public_key: [1u8; 32],
            role,
            profile: Profile {
                name: format!("{role} one"),
                age: 45,
                id_number: "STR".into(),
                address_text: "Jakarta".into(),
                phone: "0812".into(),
            },
            specialization: None,
            patient_id: None,
            registered_at: 0,
        }
    }

    fn record<'a>(creator: &'a Identity, patient_id: &'a str, level: AccessLevel) -> NewRecord<'a> {
        NewRecord {
            creator,
            patient_id,
            data: json!({"diagnosis": "Hypertension", "medication": "Amlodipine 5mg"}),
            access_level: level,
            expiry_years: None,
        }
    }

    fn blocks_of(ledger: &Ledger) -> Vec<Block> {
        ledger.snapshot().iter().map(|b| (**b).clone()).collect()
    }

    #[test]
    fn test_new_chain_is_valid() {
        let ledger = Ledger::new(1_000);
        assert_eq!(ledger.len(), 1);
        let report = ledger.verify();
        assert!(report.valid);
        assert_eq!(report.total_blocks, 1);
        assert!(ensure_valid(&report).is_ok());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let ledger = Ledger::new(1_000);
        let doctor = staff(Role::Doctor);
        let mut rec = record(&doctor, "P001", AccessLevel::Public);
        rec.data = json!(["not", "an", "object"]);
        assert!(matches!(
            ledger.append(rec, 2_000, ok),
            Err(LedgerError::InvalidPayload(_))
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_append_links_to_tip() {
        let ledger = Ledger::new(1_000);
        let doctor = staff(Role::Doctor);
        let genesis_hash = ledger.tip().expect("genesis").hash;

        let b1 = ledger
            .append(record(&doctor, "P001", AccessLevel::Public), 2_000, ok)
            .expect("append");
        let b2 = ledger
            .append(record(&doctor, "P001", AccessLevel::Private), 3_000, ok)
            .expect("append");

        assert_eq!(b1.index, 1);
        assert_eq!(b1.prev_hash, genesis_hash);
        assert_eq!(b2.index, 2);
        assert_eq!(b2.prev_hash, b1.hash);
        assert_eq!(b1.created_by_name, "doctor one");
        assert_eq!(b1.expiry_date, 2_000 + 5 * SECONDS_PER_YEAR);
        assert!(ledger.verify().valid);
    }

    #[test]
    fn test_append_rejects_unauthorized_tier() {
        let ledger = Ledger::new(0);
        let nurse = staff(Role::Nurse);
        let err = ledger
            .append(record(&nurse, "P001", AccessLevel::Private), 1, ok)
            .expect_err("nurse cannot write private");
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_append_bounds_expiry() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        for years in [0, MAX_EXPIRY_YEARS + 1] {
            let mut r = record(&doctor, "P001", AccessLevel::Public);
            r.expiry_years = Some(years);
            assert!(matches!(
                ledger.append(r, 1, ok),
                Err(LedgerError::InvalidExpiry(y)) if y == years
            ));
        }
        let mut r = record(&doctor, "P001", AccessLevel::Public);
        r.expiry_years = Some(MAX_EXPIRY_YEARS);
        assert!(ledger.append(r, 1, ok).is_ok());
    }

    #[test]
    fn test_append_rejects_malformed_patient_id() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        let err = ledger
            .append(record(&doctor, "", AccessLevel::Public), 1, ok)
            .expect_err("empty subject");
        assert!(matches!(err, LedgerError::InvalidPatientId(_)));
    }

    #[test]
    fn test_failed_commit_leaves_chain_untouched() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        let err = ledger
            .append(record(&doctor, "P001", AccessLevel::Public), 1, |_| {
                Err("disk full")
            })
            .expect_err("commit fails");
        assert!(matches!(err, LedgerError::Persistence(ref m) if m == "disk full"));
        assert_eq!(ledger.len(), 1);

        let next = ledger
            .append(record(&doctor, "P001", AccessLevel::Public), 2, ok)
            .expect("append");
        assert_eq!(next.index, 1);
    }

    #[test]
    fn test_tampered_payload_detected_at_its_index() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        for t in 1..=4 {
            ledger
                .append(record(&doctor, "P001", AccessLevel::Patient), t, ok)
                .expect("append");
        }

        for target in 1..=4usize {
            let mut blocks = blocks_of(&ledger);
            blocks[target].data["diagnosis"] = json!("Hypertensioo");
            let tampered = Ledger::from_blocks(blocks).expect("restore");
            let report = tampered.verify();
            assert!(!report.valid);
            assert_eq!(report.first_invalid_index, Some(target as u64));
            assert!(matches!(
                ensure_valid(&report),
                Err(LedgerError::IntegrityViolation { index }) if index == target as u64
            ));
        }
    }

    #[test]
    fn test_rehashed_tamper_breaks_next_link() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        for t in 1..=3 {
            ledger
                .append(record(&doctor, "P001", AccessLevel::Patient), t, ok)
                .expect("append");
        }
        let mut blocks = blocks_of(&ledger);
        blocks[1].data = json!({"diagnosis": "none"});
        blocks[1].hash = block::compute_hash(&blocks[1]);
        let report = verify_blocks(&blocks);
        assert_eq!(report.first_invalid_index, Some(2));
    }

    #[test]
    fn test_restore_roundtrip_verifies_identically() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        ledger
            .append(record(&doctor, "P001", AccessLevel::Public), 1, ok)
            .expect("append");
        let restored = Ledger::from_blocks(blocks_of(&ledger)).expect("restore");
        assert_eq!(restored.verify(), ledger.verify());
        assert!(Ledger::from_blocks(Vec::new()).is_err());
    }

    #[test]
    fn test_blocks_for_patient_in_order_and_lazy() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        for (t, pid) in [(1, "P001"), (2, "P002"), (3, "P001"), (4, "P001")] {
            ledger
                .append(record(&doctor, pid, AccessLevel::Public), t, ok)
                .expect("append");
        }
        let indices: Vec<u64> = ledger.blocks_for_patient("P001").map(|b| b.index).collect();
        assert_eq!(indices, vec![1, 3, 4]);

        let first = ledger.blocks_for_patient("P001").next().expect("first");
        assert_eq!(first.index, 1);
        assert_eq!(ledger.blocks_for_patient("P404").count(), 0);
    }

    #[test]
    fn test_expired_count() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        let mut r = record(&doctor, "P001", AccessLevel::Public);
        r.expiry_years = Some(1);
        ledger.append(r, 0, ok).expect("append");
        ledger
            .append(record(&doctor, "P001", AccessLevel::Public), 0, ok)
            .expect("append");

        assert_eq!(ledger.expired_count(360 * SECONDS_PER_DAY), 0);
        assert_eq!(ledger.expired_count(366 * SECONDS_PER_DAY), 1);
    }

    #[test]
    fn test_concurrent_appends_form_one_chain() {
        let ledger = Ledger::new(0);
        let doctor = staff(Role::Doctor);
        let threads = 8;
        let per_thread = 25;

        std::thread::scope(|s| {
            for t in 0..threads {
                let ledger = &ledger;
                let doctor = &doctor;
                s.spawn(move || {
                    for i in 0..per_thread {
                        let mut r = record(doctor, "P001", AccessLevel::Public);
                        r.data = json!({"thread": t, "seq": i});
                        ledger.append(r, 1, ok).expect("append");
                    }
                });
            }
        });

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 1 + threads * per_thread);
        for (i, b) in snapshot.iter().enumerate() {
            assert_eq!(b.index, i as u64);
        }
        assert!(ledger.verify().valid);
    }
}
