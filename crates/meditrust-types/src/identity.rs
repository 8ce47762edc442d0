//! Identities, roles and the role capability table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{Address, PatientId, TypesError};

/// Role of a registered identity.
///
/// Closed set. Everything a role may do is read off [`Role::capabilities`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Nurse,
    Doctor,
    MedicalCommittee,
    Director,
    Patient,
    ExPatient,
    Family,
}

/// What a role is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Member of the clinical staff.
    pub clinical: bool,
    /// Reads and writes the private tier without an approval.
    pub private_tier: bool,
    /// Must be bound to a patient id.
    pub patient_bound: bool,
    /// Holds one of the two signature slots of an access request.
    pub signer: bool,
    /// Sees expired records in full.
    pub audit: bool,
}

impl Role {
    /// Every role, in display order.
    pub const ALL: [Role; 7] = [
        Role::Nurse,
        Role::Doctor,
        Role::MedicalCommittee,
        Role::Director,
        Role::Patient,
        Role::ExPatient,
        Role::Family,
    ];

    /// Roles whose signatures an access request needs (2-of-2).
    pub const SIGNERS: [Role; 2] = [Role::Doctor, Role::MedicalCommittee];

    /// The capability table.
    pub const fn capabilities(self) -> Capabilities {
        const fn caps(
            clinical: bool,
            private_tier: bool,
            patient_bound: bool,
            signer: bool,
            audit: bool,
        ) -> Capabilities {
            Capabilities {
                clinical,
                private_tier,
                patient_bound,
                signer,
                audit,
            }
        }
        match self {
            Role::Nurse => caps(true, false, false, false, false),
            Role::Doctor => caps(true, true, false, true, false),
            Role::MedicalCommittee => caps(true, true, false, true, false),
            Role::Director => caps(true, true, false, false, true),
            Role::Patient => caps(false, false, true, false, false),
            Role::ExPatient => caps(false, false, true, false, false),
            Role::Family => caps(false, false, true, false, false),
        }
    }

    pub const fn is_clinical(self) -> bool {
        self.capabilities().clinical
    }

    pub const fn requires_patient_id(self) -> bool {
        self.capabilities().patient_bound
    }

    /// Wire name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Nurse => "nurse",
            Role::Doctor => "doctor",
            Role::MedicalCommittee => "medical_committee",
            Role::Director => "director",
            Role::Patient => "patient",
            Role::ExPatient => "ex_patient",
            Role::Family => "family",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TypesError;

    /// Accepts the wire names plus the hyphenated `ex-patient` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nurse" => Ok(Role::Nurse),
            "doctor" => Ok(Role::Doctor),
            "medical_committee" => Ok(Role::MedicalCommittee),
            "director" => Ok(Role::Director),
            "patient" => Ok(Role::Patient),
            "ex_patient" | "ex-patient" => Ok(Role::ExPatient),
            "family" => Ok(Role::Family),
            _ => Err(TypesError::InvalidRole(s.to_string())),
        }
    }
}

/// Personal details captured at registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u32,
    /// National ID, licence or registration number.
    pub id_number: String,
    pub address_text: String,
    pub phone: String,
}

/// A registered identity.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: Address,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub public_key: [u8; 32],
    pub role: Role,
    pub profile: Profile,
    /// Doctors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    /// Patient, ex-patient and family only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub registered_at: u64,
}

impl Identity {
    /// Whether this identity is bound to the given patient.
    pub fn is_bound_to(&self, patient_id: &str) -> bool {
        self.role.requires_patient_id() && self.patient_id.as_deref() == Some(patient_id)
    }
}

/// An audited role transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    pub address: Address,
    pub from: Role,
    pub to: Role,
    pub changed_at: u64,
}

/// Public listing entry for one identity. Carries no key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub address: Address,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    pub registered_at: u64,
}

impl From<&Identity> for UserSummary {
    fn from(identity: &Identity) -> Self {
        Self {
            address: identity.address.clone(),
            name: identity.profile.name.clone(),
            specialization: identity.specialization.clone(),
            patient_id: identity.patient_id.clone(),
            registered_at: identity.registered_at,
        }
    }
}

/// Identities sharing one role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGroup {
    pub role: Role,
    pub count: usize,
    pub users: Vec<UserSummary>,
}

/// All identities grouped by role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListing {
    pub groups: Vec<RoleGroup>,
    pub total: usize,
}

impl UserListing {
    /// Number of identities holding `role`.
    pub fn count(&self, role: Role) -> usize {
        self.groups
            .iter()
            .find(|g| g.role == role)
            .map(|g| g.count)
            .unwrap_or(0)
    }
}
