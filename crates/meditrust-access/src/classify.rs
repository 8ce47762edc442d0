//! Partitioning a patient's blocks into visibility buckets.

use std::borrow::Borrow;

use meditrust_types::{validate_patient_id, Block, ExpiredNotice, Identity, PatientData, RecordView};

use crate::policy::{read_grant, ReadGrant};
use crate::Result;

/// Answers whether a request id unlocks a patient's private tier.
pub trait ApprovalOracle {
    fn is_approved(&self, request_id: &str, patient_id: &str, now: u64) -> bool;
}

/// Oracle for callers that never accept approvals.
impl ApprovalOracle for () {
    fn is_approved(&self, _request_id: &str, _patient_id: &str, _now: u64) -> bool {
        false
    }
}

/// Buckets handed to the reader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    pub data: PatientData,
    /// An approval released at least one live private block.
    pub approval_used: bool,
}

/// Partition `blocks` about `patient_id` into what `reader` may see.
///
/// Blocks about other subjects are skipped. Buckets the reader is not
/// entitled to come back empty, so a patient that does not exist looks the
/// same as one the reader may not see. The oracle is consulted at most once,
/// and only when a private block needs an approval.
///
/// Expired blocks are reported as notices without payload. The audit role
/// additionally keeps them in the normal buckets.
///
/// # Errors
///
/// [`crate::AccessError::InvalidPatientId`] if `patient_id` is malformed.
pub fn classify<I, B>(
    reader: &Identity,
    patient_id: &str,
    blocks: I,
    request_id: Option<&str>,
    oracle: &dyn ApprovalOracle,
    now: u64,
) -> Result<Classification>
where
    I: IntoIterator<Item = B>,
    B: Borrow<Block>,
{
    validate_patient_id(patient_id)?;

    let audit = reader.role.capabilities().audit;
    let mut approval: Option<bool> = None;
    let mut out = Classification::default();

    for entry in blocks {
        let block: &Block = entry.borrow();
        if block.patient_id != patient_id || block.is_genesis() {
            continue;
        }

        let via_approval = match read_grant(reader, block.access_level, patient_id) {
            ReadGrant::Allowed => false,
            ReadGrant::Denied => continue,
            ReadGrant::NeedsApproval => {
                let approved = *approval.get_or_insert_with(|| {
                    request_id.is_some_and(|id| oracle.is_approved(id, patient_id, now))
                });
                if !approved {
                    continue;
                }
                true
            }
        };

        if block.is_expired(now) {
            out.data.expired.push(ExpiredNotice::from(block));
            if !audit {
                continue;
            }
        }

        out.data
            .bucket_mut(block.access_level)
            .push(RecordView::from(block));
        out.approval_used |= via_approval;
    }

    tracing::debug!(
        reader = %reader.address,
        patient_id,
        public = out.data.public.len(),
        private = out.data.private.len(),
        patient = out.data.patient.len(),
        expired = out.data.expired.len(),
        "classified patient data"
    );

    Ok(out)
}
