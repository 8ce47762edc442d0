//! The engine facade.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use zeroize::Zeroizing;

use meditrust_access::classify;
use meditrust_crypto::ed25519::Signature;
use meditrust_db::queries::{blocks, identities, requests};
use meditrust_ledger::{block, Ledger, NewRecord};
use meditrust_multisig::{SignOutcome, Workflow};
use meditrust_registry::{Registered, Registration, Registry, Session};
use meditrust_types::{
    AccessLevel, AccessRequest, ApprovalPolicy, Block, ChainReport, DataType, Identity,
    PatientData, UserListing,
};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::journal::{Journal, NullJournal, SqliteJournal};
use crate::{EngineError, Result};

/// Input to [`Engine::add_health_data`].
#[derive(Clone, Debug)]
pub struct HealthRecord {
    pub patient_id: String,
    pub data: Value,
    pub access_level: AccessLevel,
    pub creator_address: String,
    /// `None` uses the configured default.
    pub expiry_years: Option<u32>,
}

/// What a signer presents to [`Engine::sign_access_request`].
pub enum SignCredential {
    /// 64 hex characters. The engine signs on the signer's behalf.
    PrivateKey(Zeroizing<String>),
    /// A signature made elsewhere over the request's canonical payload.
    Signature(Signature),
}

impl SignCredential {
    /// Tell a private key from a signature by its length.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw.len() {
            64 => Ok(SignCredential::PrivateKey(Zeroizing::new(raw.to_string()))),
            128 => Signature::from_hex(raw)
                .map(SignCredential::Signature)
                .map_err(|e| EngineError::InvalidInput(format!("signature: {e}"))),
            n => Err(EngineError::InvalidInput(format!(
                "expected a 64-character private key or a 128-character signature, got {n} characters"
            ))),
        }
    }
}

impl fmt::Debug for SignCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignCredential::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            SignCredential::Signature(sig) => f.debug_tuple("Signature").field(sig).finish(),
        }
    }
}

/// Result of the expired-data audit. Nothing is erased.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExpiryScan {
    pub expired_blocks: usize,
    pub total_blocks: usize,
}

/// Counters for the node status call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub total_blocks: usize,
    pub users: usize,
    pub access_requests: usize,
    pub approval_policy: ApprovalPolicy,
    pub tip_hash: String,
}

/// Owns the registry, ledger and approval workflow.
pub struct Engine {
    registry: Registry,
    ledger: Ledger,
    workflow: Workflow,
    journal: Box<dyn Journal>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    /// A fresh engine that persists nothing.
    pub fn ephemeral(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Registry::new(),
            ledger: Ledger::new(clock.now()),
            workflow: Workflow::new(config.request_ttl_secs, config.approval_policy),
            journal: Box::new(NullJournal),
            clock,
            config,
        }
    }

    /// Load persisted state from `db` and journal every later mutation to it.
    ///
    /// An empty database gets a genesis block. The chain is restored verbatim;
    /// call [`Engine::verify_chain`] to audit it.
    pub fn open(
        db: Arc<Mutex<Connection>>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (stored_identities, role_changes, mut stored_blocks, stored_requests) = {
            let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
            (
                identities::list(&conn)?,
                identities::list_role_changes(&conn)?,
                blocks::list(&conn)?,
                requests::list(&conn)?,
            )
        };

        let journal = SqliteJournal::new(db);
        if stored_blocks.is_empty() {
            let genesis = block::genesis(clock.now());
            journal.record_block(&genesis)?;
            tracing::info!(hash = %genesis.hash_hex(), "genesis block written");
            stored_blocks.push(genesis);
        }

        tracing::info!(
            blocks = stored_blocks.len(),
            users = stored_identities.len(),
            requests = stored_requests.len(),
            "engine state loaded"
        );

        Ok(Self {
            registry: Registry::from_parts(stored_identities, role_changes),
            ledger: Ledger::from_blocks(stored_blocks)?,
            workflow: Workflow::from_requests(
                config.request_ttl_secs,
                config.approval_policy,
                stored_requests,
            ),
            journal: Box::new(journal),
            clock,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // ---- identities ----

    pub fn register(&self, registration: Registration) -> Result<Registered> {
        Ok(self
            .registry
            .register(registration, self.clock.now(), |identity| {
                self.journal.record_identity(identity)
            })?)
    }

    /// Log in with a private key.
    pub fn login(&self, private_key_hex: &str) -> Result<Session> {
        Ok(self.registry.login(private_key_hex)?)
    }

    /// Log in with a bare address.
    pub fn resolve_address(&self, address: &str) -> Result<Session> {
        Ok(self.registry.login_address(address)?)
    }

    pub fn list_users(&self) -> UserListing {
        self.registry.list_users()
    }

    /// Identities bound to `patient_id`, in address order.
    pub fn patient_identities(&self, patient_id: &str) -> Vec<Identity> {
        let mut bound = self.registry.patients(patient_id);
        bound.sort_by(|a, b| a.address.cmp(&b.address));
        bound
    }

    /// Move every patient bound to `patient_id` to ex_patient.
    pub fn convert_patient(&self, patient_id: &str) -> Result<Vec<Identity>> {
        Ok(self.registry.convert_patient_to_ex_patient(
            patient_id,
            self.clock.now(),
            |changed, changes| self.journal.record_conversion(changed, changes),
        )?)
    }

    // ---- records ----

    pub fn add_health_data(&self, record: HealthRecord) -> Result<Arc<Block>> {
        let creator = self.registry.resolve(&record.creator_address)?;
        let block = self.ledger.append(
            NewRecord {
                creator: &creator,
                patient_id: &record.patient_id,
                data: record.data,
                access_level: record.access_level,
                expiry_years: Some(
                    record
                        .expiry_years
                        .unwrap_or(self.config.default_expiry_years),
                ),
            },
            self.clock.now(),
            |block| self.journal.record_block(block),
        )?;
        Ok(block)
    }

    /// A patient's records as `requester_address` may see them.
    ///
    /// Under [`ApprovalPolicy::SingleUse`] a request id that released private
    /// data is spent by this call. If another reader spent it first, the
    /// private tier is withheld.
    pub fn get_patient_data(
        &self,
        patient_id: &str,
        requester_address: &str,
        request_id: Option<&str>,
    ) -> Result<PatientData> {
        let reader = self.registry.resolve(requester_address)?;
        let now = self.clock.now();

        let view = classify(
            &reader,
            patient_id,
            self.ledger.blocks_for_patient(patient_id),
            request_id,
            &self.workflow,
            now,
        )?;

        if let (Some(request_id), true) = (request_id, view.approval_used) {
            if self.workflow.policy() == ApprovalPolicy::SingleUse
                && !self
                    .workflow
                    .consume(request_id, now, |r| self.journal.record_request(r))?
            {
                let view = classify(
                    &reader,
                    patient_id,
                    self.ledger.blocks_for_patient(patient_id),
                    None,
                    &(),
                    now,
                )?;
                return Ok(view.data);
            }
        }

        Ok(view.data)
    }

    // ---- approvals ----

    pub fn create_access_request(
        &self,
        patient_id: &str,
        requester_address: &str,
        data_type: DataType,
    ) -> Result<AccessRequest> {
        let requester = self.registry.resolve(requester_address)?;
        Ok(self.workflow.create_request(
            patient_id,
            &requester,
            data_type,
            self.clock.now(),
            |request| self.journal.record_request(request),
        )?)
    }

    pub fn sign_access_request(
        &self,
        request_id: &str,
        signer_address: &str,
        credential: &SignCredential,
    ) -> Result<SignOutcome> {
        let signer = self.registry.resolve(signer_address)?;
        let now = self.clock.now();
        let commit = |request: &AccessRequest| self.journal.record_request(request);

        let outcome = match credential {
            SignCredential::PrivateKey(key) => {
                self.workflow
                    .sign_with_key(request_id, &signer, key.as_str(), now, commit)?
            }
            SignCredential::Signature(signature) => {
                self.workflow
                    .sign(request_id, &signer, signature, now, commit)?
            }
        };
        Ok(outcome)
    }

    pub fn get_access_request(&self, request_id: &str) -> Result<AccessRequest> {
        Ok(self.workflow.get(request_id, self.clock.now())?)
    }

    /// Requests about `patient_id` with lazy expiry applied.
    pub fn access_requests_for_patient(&self, patient_id: &str) -> Vec<AccessRequest> {
        self.workflow
            .requests_for_patient(patient_id, self.clock.now())
    }

    // ---- audits ----

    pub fn verify_chain(&self) -> ChainReport {
        self.ledger.verify()
    }

    /// Verify the chain and fail on the first block that does not check out.
    pub fn ensure_chain_valid(&self) -> Result<ChainReport> {
        let report = self.ledger.verify();
        Self::check_chain(&report)?;
        Ok(report)
    }

    /// Turn a failed audit into an [`ErrorKind::Integrity`](crate::ErrorKind) error.
    pub fn check_chain(report: &ChainReport) -> Result<()> {
        Ok(meditrust_ledger::chain::ensure_valid(report)?)
    }

    pub fn scan_expired(&self) -> ExpiryScan {
        let scan = ExpiryScan {
            expired_blocks: self.ledger.expired_count(self.clock.now()),
            total_blocks: self.ledger.len(),
        };
        tracing::info!(
            expired = scan.expired_blocks,
            total = scan.total_blocks,
            "expired data scan"
        );
        scan
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            total_blocks: self.ledger.len(),
            users: self.registry.len(),
            access_requests: self.workflow.len(),
            approval_policy: self.workflow.policy(),
            tip_hash: self
                .ledger
                .tip()
                .map(|b| b.hash_hex())
                .unwrap_or_default(),
        }
    }
}
