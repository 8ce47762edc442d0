//! Integration test: the clinical approval flow.
//!
//! A doctor records data about patient P001 at all three tiers. The patient
//! requests private access, the doctor and the medical committee sign, and
//! the patient reads the private tier with the approved request id. Runs
//! against an in-process engine with a manual clock; nothing is persisted.

use std::sync::Arc;

use serde_json::json;

use meditrust_engine::{Engine, EngineConfig, EngineError, HealthRecord, ManualClock, SignCredential};
use meditrust_multisig::payload::canonical_payload;
use meditrust_multisig::MultisigError;
use meditrust_registry::{Registered, Registration};
use meditrust_types::{
    AccessLevel, ApprovalPolicy, DataType, PatientData, Profile, RequestStatus, Role,
};

/// Simulated timestamp for deterministic testing.
const TEST_TIMESTAMP: u64 = 1_700_000_000;

const PATIENT_ID: &str = "P001";

struct Clinic {
    engine: Engine,
    doctor: Registered,
    committee: Registered,
    patient: Registered,
    nurse: Registered,
}

fn register(engine: &Engine, role: &str, name: &str, patient_id: Option<&str>) -> Registered {
    engine
        .register(Registration {
            role: role.to_string(),
            profile: Profile {
                name: name.to_string(),
                age: 42,
                id_number: "3174010101800001".to_string(),
                address_text: "Jl. Sudirman 1, Jakarta".to_string(),
                phone: "081200000000".to_string(),
            },
            patient_id: patient_id.map(str::to_string),
            specialization: None,
            existing_private_key: None,
        })
        .expect("registration should succeed")
}

fn clinic(policy: ApprovalPolicy) -> Clinic {
    let config = EngineConfig {
        approval_policy: policy,
        ..EngineConfig::default()
    };
    let engine = Engine::ephemeral(config, Arc::new(ManualClock::new(TEST_TIMESTAMP)));
    let doctor = register(&engine, "doctor", "Dr. Budi", None);
    let committee = register(&engine, "medical_committee", "Komite Medik", None);
    let patient = register(&engine, "patient", "Siti", Some(PATIENT_ID));
    let nurse = register(&engine, "nurse", "Ani", None);
    Clinic {
        engine,
        doctor,
        committee,
        patient,
        nurse,
    }
}

fn record(clinic: &Clinic, creator: &Registered, level: AccessLevel, data: serde_json::Value) {
    clinic
        .engine
        .add_health_data(HealthRecord {
            patient_id: PATIENT_ID.to_string(),
            data,
            access_level: level,
            creator_address: creator.identity.address.clone(),
            expiry_years: None,
        })
        .expect("append should succeed");
}

fn key(registered: &Registered) -> SignCredential {
    let key = registered.private_key.as_ref().expect("generated key");
    SignCredential::parse(key).expect("64 hex characters")
}

fn open_request(clinic: &Clinic) -> String {
    clinic
        .engine
        .create_access_request(PATIENT_ID, &clinic.patient.identity.address, DataType::Private)
        .expect("patient may request their own data")
        .request_id
}

#[test]
fn doctor_and_committee_release_private_tier() {
    let clinic = clinic(ApprovalPolicy::Standing);
    let patient_address = clinic.patient.identity.address.clone();

    record(&clinic, &clinic.nurse, AccessLevel::Public, json!({ "blood_pressure": "120/80" }));
    record(&clinic, &clinic.doctor, AccessLevel::Patient, json!({ "prescription": "Metformin" }));
    record(&clinic, &clinic.doctor, AccessLevel::Private, json!({ "diagnosis": "Diabetes" }));

    // Without a request id the private tier stays closed.
    let view = clinic
        .engine
        .get_patient_data(PATIENT_ID, &patient_address, None)
        .expect("read");
    assert_eq!(view.public.len(), 1);
    assert_eq!(view.patient.len(), 1);
    assert!(view.private.is_empty());

    let request_id = open_request(&clinic);
    assert_eq!(request_id.len(), 32);

    let outcome = clinic
        .engine
        .sign_access_request(&request_id, &clinic.doctor.identity.address, &key(&clinic.doctor))
        .expect("doctor signs");
    assert!(!outcome.approved());
    assert_eq!(outcome.request.missing_roles(), vec![Role::MedicalCommittee]);

    // One signature is not enough.
    let view = clinic
        .engine
        .get_patient_data(PATIENT_ID, &patient_address, Some(&request_id))
        .expect("read");
    assert!(view.private.is_empty());

    let outcome = clinic
        .engine
        .sign_access_request(
            &request_id,
            &clinic.committee.identity.address,
            &key(&clinic.committee),
        )
        .expect("committee signs");
    assert!(outcome.approved());
    assert!(outcome.newly_approved);
    assert_eq!(outcome.request.status, RequestStatus::Approved);

    let view = clinic
        .engine
        .get_patient_data(PATIENT_ID, &patient_address, Some(&request_id))
        .expect("read");
    assert_eq!(view.private.len(), 1);
    assert_eq!(view.private[0].data["diagnosis"], "Diabetes");
}

#[test]
fn signature_order_does_not_matter() {
    let clinic = clinic(ApprovalPolicy::Standing);
    let request_id = open_request(&clinic);

    let first = clinic
        .engine
        .sign_access_request(
            &request_id,
            &clinic.committee.identity.address,
            &key(&clinic.committee),
        )
        .expect("committee signs first");
    assert!(!first.approved());

    let second = clinic
        .engine
        .sign_access_request(&request_id, &clinic.doctor.identity.address, &key(&clinic.doctor))
        .expect("doctor signs second");
    assert!(second.approved());
}

#[test]
fn externally_produced_signature_is_accepted() {
    let clinic = clinic(ApprovalPolicy::Standing);
    let request_id = open_request(&clinic);

    let payload = canonical_payload(&request_id, PATIENT_ID, DataType::Private);
    let doctor_key = clinic.doctor.private_key.as_ref().expect("key");
    let signature = meditrust_crypto::keys::sign(doctor_key, &payload).expect("sign");
    let credential = SignCredential::parse(&signature.to_hex()).expect("128 hex characters");

    let outcome = clinic
        .engine
        .sign_access_request(&request_id, &clinic.doctor.identity.address, &credential)
        .expect("signature verifies");
    assert!(outcome.recorded);

    // A signature over a different payload is rejected.
    let other = canonical_payload(&request_id, PATIENT_ID, DataType::Patient);
    let committee_key = clinic.committee.private_key.as_ref().expect("key");
    let forged = meditrust_crypto::keys::sign(committee_key, &other).expect("sign");
    let err = clinic
        .engine
        .sign_access_request(
            &request_id,
            &clinic.committee.identity.address,
            &SignCredential::Signature(forged),
        )
        .expect_err("wrong payload");
    assert!(matches!(
        err,
        EngineError::Multisig(MultisigError::InvalidSignature)
    ));
}

#[test]
fn second_signature_for_a_role_is_rejected() {
    let clinic = clinic(ApprovalPolicy::Standing);
    let request_id = open_request(&clinic);
    let doctor = &clinic.doctor.identity.address;

    clinic
        .engine
        .sign_access_request(&request_id, doctor, &key(&clinic.doctor))
        .expect("first signature");
    let before = clinic
        .engine
        .get_access_request(&request_id)
        .expect("get")
        .signatures;

    // A second doctor fills the same slot.
    let other_doctor = register(&clinic.engine, "doctor", "Dr. Rina", None);
    let err = clinic
        .engine
        .sign_access_request(&request_id, &other_doctor.identity.address, &key(&other_doctor))
        .expect_err("slot already used");
    assert!(matches!(
        err,
        EngineError::Multisig(MultisigError::DuplicateSignature(Role::Doctor))
    ));

    let after = clinic
        .engine
        .get_access_request(&request_id)
        .expect("get")
        .signatures;
    assert_eq!(before, after);
}

#[test]
fn single_use_approval_is_spent_by_first_read() {
    let clinic = clinic(ApprovalPolicy::SingleUse);
    record(&clinic, &clinic.doctor, AccessLevel::Private, json!({ "diagnosis": "Asthma" }));
    let request_id = open_request(&clinic);
    for signer in [&clinic.doctor, &clinic.committee] {
        clinic
            .engine
            .sign_access_request(&request_id, &signer.identity.address, &key(signer))
            .expect("sign");
    }

    let patient = &clinic.patient.identity.address;
    let first = clinic
        .engine
        .get_patient_data(PATIENT_ID, patient, Some(&request_id))
        .expect("first read");
    assert_eq!(first.private.len(), 1);

    let second = clinic
        .engine
        .get_patient_data(PATIENT_ID, patient, Some(&request_id))
        .expect("second read");
    assert!(second.private.is_empty());
    let spent = clinic.engine.get_access_request(&request_id).expect("get");
    assert_eq!(spent.status, RequestStatus::Approved);
    assert_eq!(spent.consumed_at, Some(TEST_TIMESTAMP));
}

#[test]
fn standing_approval_is_reusable() {
    let clinic = clinic(ApprovalPolicy::Standing);
    record(&clinic, &clinic.doctor, AccessLevel::Private, json!({ "diagnosis": "Asthma" }));
    let request_id = open_request(&clinic);
    for signer in [&clinic.committee, &clinic.doctor] {
        clinic
            .engine
            .sign_access_request(&request_id, &signer.identity.address, &key(signer))
            .expect("sign");
    }

    let patient = &clinic.patient.identity.address;
    for _ in 0..3 {
        let view = clinic
            .engine
            .get_patient_data(PATIENT_ID, patient, Some(&request_id))
            .expect("read");
        assert_eq!(view.private.len(), 1);
    }
}

#[test]
fn missing_and_forbidden_patients_look_alike() {
    let clinic = clinic(ApprovalPolicy::Standing);
    record(&clinic, &clinic.doctor, AccessLevel::Patient, json!({ "note": "rest" }));
    record(&clinic, &clinic.doctor, AccessLevel::Private, json!({ "note": "biopsy" }));

    let relative = register(&clinic.engine, "family", "Ibu Wati", Some("P002"));

    let forbidden = clinic
        .engine
        .get_patient_data(PATIENT_ID, &relative.identity.address, None)
        .expect("read");
    let missing = clinic
        .engine
        .get_patient_data("P404", &relative.identity.address, None)
        .expect("read");

    assert_eq!(forbidden, PatientData::default());
    assert_eq!(
        serde_json::to_value(&forbidden).expect("serialize"),
        serde_json::to_value(&missing).expect("serialize")
    );
}

#[test]
fn ex_patient_keeps_reading_own_records() {
    let clinic = clinic(ApprovalPolicy::Standing);
    record(&clinic, &clinic.doctor, AccessLevel::Patient, json!({ "discharge": "stable" }));

    let converted = clinic.engine.convert_patient(PATIENT_ID).expect("convert");
    assert_eq!(converted.len(), 1);
    assert_eq!(converted[0].role, Role::ExPatient);

    let session = clinic
        .engine
        .resolve_address(&clinic.patient.identity.address)
        .expect("resolve");
    assert_eq!(session.identity.role, Role::ExPatient);
    assert!(!session.can_access_private);

    let view = clinic
        .engine
        .get_patient_data(PATIENT_ID, &clinic.patient.identity.address, None)
        .expect("read");
    assert_eq!(view.patient.len(), 1);

    let listing = clinic.engine.list_users();
    assert_eq!(listing.total, 4);
}
