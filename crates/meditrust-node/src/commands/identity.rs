//! Identity and registry command handlers.

use std::sync::Arc;

use serde_json::{json, Value};
use zeroize::Zeroizing;

use meditrust_registry::{Registration, Session};
use meditrust_types::{EventType, Profile};

use super::{address_param, opt_str_param, str_param, with_engine, Result};
use crate::rpc::RpcError;
use crate::NodeState;

fn session_json(session: &Session) -> Value {
    json!({
        "identity": session.identity,
        "can_access_private": session.can_access_private,
    })
}

/// Register a new identity. Generates a key pair unless `private_key` is given.
pub async fn register(state: &Arc<NodeState>, params: &Value) -> Result {
    let age = params
        .get("age")
        .and_then(Value::as_u64)
        .and_then(|a| u32::try_from(a).ok())
        .ok_or_else(|| RpcError::invalid_params("age required"))?;

    let registration = Registration {
        role: str_param(params, "role")?.to_string(),
        profile: Profile {
            name: str_param(params, "name")?.to_string(),
            age,
            id_number: str_param(params, "id_number")?.to_string(),
            address_text: str_param(params, "address_text")?.to_string(),
            phone: str_param(params, "phone")?.to_string(),
        },
        patient_id: opt_str_param(params, "patient_id")?.map(str::to_string),
        specialization: opt_str_param(params, "specialization")?.map(str::to_string),
        existing_private_key: opt_str_param(params, "private_key")?
            .map(|k| Zeroizing::new(k.to_string())),
    };

    let registered = with_engine(state, move |engine| engine.register(registration)).await?;
    let identity = &registered.identity;

    state.event_bus.emit(
        EventType::UserRegistered,
        json!({
            "address": identity.address,
            "role": identity.role,
            "patient_id": identity.patient_id,
        }),
    );

    Ok(json!({
        "identity": identity,
        "private_key": registered.private_key.as_ref().map(|k| k.as_str()),
    }))
}

/// Log in by private key.
pub async fn login(state: &Arc<NodeState>, params: &Value) -> Result {
    let key = Zeroizing::new(str_param(params, "private_key")?.to_string());
    let session = with_engine(state, move |engine| engine.login(&key)).await?;
    Ok(session_json(&session))
}

/// Log in by address.
pub async fn resolve_address(state: &Arc<NodeState>, params: &Value) -> Result {
    let address = address_param(params, "address")?.to_string();
    let session = with_engine(state, move |engine| engine.resolve_address(&address)).await?;
    Ok(session_json(&session))
}

/// Every identity grouped by role.
pub async fn list_users(state: &Arc<NodeState>) -> Result {
    let listing = with_engine(state, |engine| Ok(engine.list_users())).await?;
    Ok(json!(listing))
}

/// Identities bound to a patient id.
pub async fn list_patient_identities(state: &Arc<NodeState>, params: &Value) -> Result {
    let patient_id = str_param(params, "patient_id")?.to_string();
    let pid = patient_id.clone();
    let identities = with_engine(state, move |engine| Ok(engine.patient_identities(&pid))).await?;
    Ok(json!({ "patient_id": patient_id, "identities": identities }))
}

/// Patient to ex_patient for everyone bound to a patient id.
pub async fn convert_patient(state: &Arc<NodeState>, params: &Value) -> Result {
    let patient_id = str_param(params, "patient_id")?.to_string();
    let pid = patient_id.clone();
    let identities = with_engine(state, move |engine| engine.convert_patient(&pid)).await?;

    state.event_bus.emit(
        EventType::PatientConverted,
        json!({ "patient_id": patient_id, "identities": identities.len() }),
    );

    Ok(json!({ "patient_id": patient_id, "identities": identities }))
}
