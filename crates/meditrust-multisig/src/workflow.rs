//! The request store and its state machine.
//!
//! All transitions happen under one lock, so two signers racing for the same
//! role slot cannot both succeed. Expiry is evaluated lazily whenever a
//! request is touched; there is no background timer.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use meditrust_access::ApprovalOracle;
use meditrust_crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use meditrust_types::{
    validate_patient_id, AccessRequest, ApprovalPolicy, DataType, Identity, RequestId,
    RequestStatus, SignatureEntry,
};

use crate::payload::{new_request_id, request_payload};
use crate::{MultisigError, Result};

/// Result of a sign attempt that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignOutcome {
    pub request: AccessRequest,
    /// A signature was added by this call.
    pub recorded: bool,
    /// This call moved the request to approved.
    pub newly_approved: bool,
}

impl SignOutcome {
    pub fn approved(&self) -> bool {
        self.request.is_approved()
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        if !self.recorded {
            return "Request already approved".to_string();
        }
        if self.newly_approved {
            return "All signatures collected. Request approved".to_string();
        }
        let waiting: Vec<&str> = self
            .request
            .missing_roles()
            .into_iter()
            .map(|r| r.as_str())
            .collect();
        format!("Signature recorded. Waiting for: {}", waiting.join(", "))
    }
}

/// Access requests by id, with the workflow rules.
#[derive(Debug)]
pub struct Workflow {
    requests: Mutex<HashMap<RequestId, AccessRequest>>,
    ttl_secs: u64,
    policy: ApprovalPolicy,
}

/// Apply lazy expiry. Returns true when the request just expired.
fn refresh(request: &mut AccessRequest, now: u64) -> bool {
    if !request.status.is_terminal() && request.ttl_elapsed(now) {
        request.status = RequestStatus::Expired;
        tracing::info!(request_id = %request.request_id, "access request expired");
        return true;
    }
    false
}

impl Workflow {
    pub fn new(ttl_secs: u64, policy: ApprovalPolicy) -> Self {
        Self::from_requests(ttl_secs, policy, Vec::new())
    }

    /// Restore persisted requests.
    pub fn from_requests(ttl_secs: u64, policy: ApprovalPolicy, requests: Vec<AccessRequest>) -> Self {
        Self {
            requests: Mutex::new(
                requests
                    .into_iter()
                    .map(|r| (r.request_id.clone(), r))
                    .collect(),
            ),
            ttl_secs,
            policy,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    /// Open a request for a patient's data.
    ///
    /// # Errors
    ///
    /// - [`MultisigError::InvalidPatientId`] for a malformed patient id
    /// - [`MultisigError::Unauthorized`] unless the requester is bound to the patient
    /// - [`MultisigError::Persistence`] if `commit` fails
    pub fn create_request<F, E>(
        &self,
        patient_id: &str,
        requester: &Identity,
        data_type: DataType,
        now: u64,
        commit: F,
    ) -> Result<AccessRequest>
    where
        F: FnOnce(&AccessRequest) -> std::result::Result<(), E>,
        E: Display,
    {
        validate_patient_id(patient_id)?;
        if !requester.is_bound_to(patient_id) {
            tracing::warn!(
                requester = %requester.address,
                role = %requester.role,
                patient_id,
                "access request rejected"
            );
            return Err(MultisigError::Unauthorized(format!(
                "{} is not linked to patient {patient_id}",
                requester.address
            )));
        }

        let request = AccessRequest {
            request_id: new_request_id(),
            patient_id: patient_id.to_string(),
            requester_address: requester.address.clone(),
            data_type,
            signatures: Default::default(),
            status: RequestStatus::Pending,
            created_at: now,
            expires_at: now.saturating_add(self.ttl_secs),
            consumed_at: None,
        };

        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        commit(&request).map_err(|e| MultisigError::Persistence(e.to_string()))?;
        requests.insert(request.request_id.clone(), request.clone());

        tracing::info!(
            request_id = %request.request_id,
            patient_id,
            data_type = %data_type,
            requester = %requester.address,
            "access request created"
        );

        Ok(request)
    }

    /// Add a signer's signature over the request's canonical payload.
    ///
    /// Checks run in order: unknown request, expired request, signer role,
    /// already approved (returns the request unchanged), role slot taken,
    /// signature validity. The request is approved once both roles are in.
    ///
    /// # Errors
    ///
    /// - [`MultisigError::NotFound`]
    /// - [`MultisigError::Expired`]
    /// - [`MultisigError::Unauthorized`] unless the signer is a doctor or committee member
    /// - [`MultisigError::DuplicateSignature`] if the signer's role already signed
    /// - [`MultisigError::InvalidSignature`]
    /// - [`MultisigError::Persistence`] if `commit` fails
    pub fn sign<F, E>(
        &self,
        request_id: &str,
        signer: &Identity,
        signature: &Signature,
        now: u64,
        commit: F,
    ) -> Result<SignOutcome>
    where
        F: FnOnce(&AccessRequest) -> std::result::Result<(), E>,
        E: Display,
    {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| MultisigError::NotFound(request_id.to_string()))?;

        refresh(request, now);
        if request.status == RequestStatus::Expired {
            return Err(MultisigError::Expired(request_id.to_string()));
        }

        if !signer.role.capabilities().signer {
            tracing::warn!(signer = %signer.address, role = %signer.role, request_id, "sign rejected");
            return Err(MultisigError::Unauthorized(format!(
                "{} may not sign access requests",
                signer.role
            )));
        }

        if request.is_approved() {
            return Ok(SignOutcome {
                request: request.clone(),
                recorded: false,
                newly_approved: false,
            });
        }

        if request.signatures.contains_key(&signer.role) {
            return Err(MultisigError::DuplicateSignature(signer.role));
        }

        let key = VerifyingKey::from_bytes(&signer.public_key)
            .map_err(|_| MultisigError::InvalidSignature)?;
        if key.verify(&request_payload(request), signature).is_err() {
            tracing::warn!(signer = %signer.address, request_id, "signature rejected");
            return Err(MultisigError::InvalidSignature);
        }

        let mut updated = request.clone();
        updated.signatures.insert(
            signer.role,
            SignatureEntry {
                signer_address: signer.address.clone(),
                signature: signature.to_bytes(),
                signed_at: now,
            },
        );
        let newly_approved = updated.has_all_signatures();
        if newly_approved {
            updated.status = RequestStatus::Approved;
        }

        commit(&updated).map_err(|e| MultisigError::Persistence(e.to_string()))?;
        *request = updated;

        tracing::info!(
            request_id,
            signer = %signer.address,
            role = %signer.role,
            approved = newly_approved,
            "access request signed"
        );

        Ok(SignOutcome {
            request: request.clone(),
            recorded: true,
            newly_approved,
        })
    }

    /// Sign on the signer's behalf with caller-held key material.
    ///
    /// # Errors
    ///
    /// [`MultisigError::InvalidKey`] for a malformed key and
    /// [`MultisigError::Unauthorized`] if the key does not belong to `signer`,
    /// plus everything [`Workflow::sign`] returns.
    pub fn sign_with_key<F, E>(
        &self,
        request_id: &str,
        signer: &Identity,
        private_key_hex: &str,
        now: u64,
        commit: F,
    ) -> Result<SignOutcome>
    where
        F: FnOnce(&AccessRequest) -> std::result::Result<(), E>,
        E: Display,
    {
        let payload = {
            let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            let request = requests
                .get(request_id)
                .ok_or_else(|| MultisigError::NotFound(request_id.to_string()))?;
            request_payload(request)
        };

        let key = SigningKey::from_hex(private_key_hex.trim())?;
        if key.verifying_key().to_bytes() != signer.public_key {
            return Err(MultisigError::Unauthorized(format!(
                "key does not belong to {}",
                signer.address
            )));
        }

        let signature = key.sign(&payload);
        self.sign(request_id, signer, &signature, now, commit)
    }

    /// A request with lazy expiry applied.
    pub fn get(&self, request_id: &str, now: u64) -> Result<AccessRequest> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| MultisigError::NotFound(request_id.to_string()))?;
        refresh(request, now);
        Ok(request.clone())
    }

    /// Requests for a patient, oldest first.
    pub fn requests_for_patient(&self, patient_id: &str, now: u64) -> Vec<AccessRequest> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<AccessRequest> = requests
            .values_mut()
            .filter(|r| r.patient_id == patient_id)
            .map(|r| {
                refresh(r, now);
                r.clone()
            })
            .collect();
        out.sort_by(|a, b| (a.created_at, &a.request_id).cmp(&(b.created_at, &b.request_id)));
        out
    }

    /// Whether `request_id` currently unlocks `patient_id`'s private tier.
    ///
    /// The request must be approved, for private data, about the same patient,
    /// and not yet spent under [`ApprovalPolicy::SingleUse`].
    pub fn approval_is_valid(&self, request_id: &str, patient_id: &str, _now: u64) -> bool {
        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        requests.get(request_id).is_some_and(|r| {
            r.is_approved()
                && r.data_type == DataType::Private
                && r.patient_id == patient_id
                && (self.policy == ApprovalPolicy::Standing || r.consumed_at.is_none())
        })
    }

    /// Spend a single-use approval. Returns whether anything changed.
    ///
    /// A no-op under [`ApprovalPolicy::Standing`] or when already spent.
    pub fn consume<F, E>(&self, request_id: &str, now: u64, commit: F) -> Result<bool>
    where
        F: FnOnce(&AccessRequest) -> std::result::Result<(), E>,
        E: Display,
    {
        if self.policy == ApprovalPolicy::Standing {
            return Ok(false);
        }
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| MultisigError::NotFound(request_id.to_string()))?;
        if !request.is_approved() || request.consumed_at.is_some() {
            return Ok(false);
        }

        let mut updated = request.clone();
        updated.consumed_at = Some(now);
        commit(&updated).map_err(|e| MultisigError::Persistence(e.to_string()))?;
        *request = updated;

        tracing::info!(request_id, "single-use approval consumed");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ApprovalOracle for Workflow {
    fn is_approved(&self, request_id: &str, patient_id: &str, now: u64) -> bool {
        self.approval_is_valid(request_id, patient_id, now)
    }
}
