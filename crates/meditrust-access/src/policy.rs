//! Per-tier read and write decisions.
//!
//! | tier    | readers                                              | writers                   |
//! |---------|------------------------------------------------------|---------------------------|
//! | public  | clinical staff, identities bound to the subject      | clinical staff            |
//! | patient | clinical staff, identities bound to the subject      | clinical staff, bound ids |
//! | private | doctor, committee, director; bound ids with approval | doctor, committee, director |

use meditrust_types::{AccessLevel, Identity};

/// Outcome of a read check for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadGrant {
    Allowed,
    /// Readable only with an approved access request for the subject.
    NeedsApproval,
    Denied,
}

/// Whether `identity` may read a block of tier `level` about `subject`.
pub fn read_grant(identity: &Identity, level: AccessLevel, subject: &str) -> ReadGrant {
    let caps = identity.role.capabilities();
    let bound = identity.is_bound_to(subject);
    match level {
        AccessLevel::Public | AccessLevel::Patient if caps.clinical || bound => ReadGrant::Allowed,
        AccessLevel::Private if caps.private_tier => ReadGrant::Allowed,
        AccessLevel::Private if bound => ReadGrant::NeedsApproval,
        _ => ReadGrant::Denied,
    }
}

/// Whether `identity` may append a block of tier `level` about `subject`.
pub fn can_write(identity: &Identity, level: AccessLevel, subject: &str) -> bool {
    let caps = identity.role.capabilities();
    match level {
        AccessLevel::Public => caps.clinical,
        AccessLevel::Patient => caps.clinical || identity.is_bound_to(subject),
        AccessLevel::Private => caps.private_tier,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use meditrust_types::{Profile, Role};

    pub(crate) fn identity(role: Role, patient_id: Option<&str>) -> Identity {
        Identity {
            address: format!("mt-{role}"),
            public_key: [0u8; 32],
            role,
            profile: Profile {
                name: role.to_string(),
                age: 40,
                id_number: "ID".into(),
                address_text: "Jakarta".into(),
                phone: "0812".into(),
            },
            specialization: None,
            patient_id: patient_id.map(str::to_string),
            registered_at: 0,
        }
    }

    #[test]
    fn test_clinical_roles_read_every_open_tier() {
        for role in [Role::Nurse, Role::Doctor, Role::MedicalCommittee, Role::Director] {
            let id = identity(role, None);
            assert_eq!(read_grant(&id, AccessLevel::Public, "P001"), ReadGrant::Allowed);
            assert_eq!(read_grant(&id, AccessLevel::Patient, "P001"), ReadGrant::Allowed);
        }
    }

    #[test]
    fn test_private_tier_readers() {
        assert_eq!(
            read_grant(&identity(Role::Nurse, None), AccessLevel::Private, "P001"),
            ReadGrant::Denied
        );
        for role in [Role::Doctor, Role::MedicalCommittee, Role::Director] {
            assert_eq!(
                read_grant(&identity(role, None), AccessLevel::Private, "P001"),
                ReadGrant::Allowed
            );
        }
        for role in [Role::Patient, Role::ExPatient, Role::Family] {
            let own = identity(role, Some("P001"));
            assert_eq!(read_grant(&own, AccessLevel::Private, "P001"), ReadGrant::NeedsApproval);
            assert_eq!(read_grant(&own, AccessLevel::Private, "P002"), ReadGrant::Denied);
        }
    }

    #[test]
    fn test_bound_identity_reads_only_own_subject() {
        let family = identity(Role::Family, Some("P001"));
        assert_eq!(read_grant(&family, AccessLevel::Public, "P001"), ReadGrant::Allowed);
        assert_eq!(read_grant(&family, AccessLevel::Patient, "P001"), ReadGrant::Allowed);
        assert_eq!(read_grant(&family, AccessLevel::Public, "P002"), ReadGrant::Denied);
        assert_eq!(read_grant(&family, AccessLevel::Patient, "P002"), ReadGrant::Denied);
    }

    #[test]
    fn test_write_table() {
        let nurse = identity(Role::Nurse, None);
        assert!(can_write(&nurse, AccessLevel::Public, "P001"));
        assert!(can_write(&nurse, AccessLevel::Patient, "P001"));
        assert!(!can_write(&nurse, AccessLevel::Private, "P001"));

        let doctor = identity(Role::Doctor, None);
        for level in AccessLevel::ALL {
            assert!(can_write(&doctor, level, "P001"));
        }

        let patient = identity(Role::Patient, Some("P001"));
        assert!(!can_write(&patient, AccessLevel::Public, "P001"));
        assert!(can_write(&patient, AccessLevel::Patient, "P001"));
        assert!(!can_write(&patient, AccessLevel::Patient, "P002"));
        assert!(!can_write(&patient, AccessLevel::Private, "P001"));
    }
}
