//! Access request and multi-signature command handlers.

use std::sync::Arc;

use serde_json::{json, Value};

use meditrust_engine::SignCredential;
use meditrust_types::{DataType, EventType};

use super::{address_param, opt_str_param, parsed_param, str_param, with_engine, Result};
use crate::rpc::RpcError;
use crate::NodeState;

/// Open a request to release a patient's data.
pub async fn create_access_request(state: &Arc<NodeState>, params: &Value) -> Result {
    let patient_id = str_param(params, "patient_id")?.to_string();
    let requester = address_param(params, "requester_address")?.to_string();
    let data_type: DataType = parsed_param(params, "data_type")?;

    let request = with_engine(state, move |engine| {
        engine.create_access_request(&patient_id, &requester, data_type)
    })
    .await?;

    state.event_bus.emit(
        EventType::AccessRequestCreated,
        json!({
            "request_id": request.request_id,
            "patient_id": request.patient_id,
            "data_type": request.data_type,
        }),
    );

    Ok(json!({ "request_id": request.request_id, "request": request }))
}

/// Sign a request with either a private key or a ready-made signature.
pub async fn sign_access_request(state: &Arc<NodeState>, params: &Value) -> Result {
    let request_id = str_param(params, "request_id")?.to_string();
    let signer = address_param(params, "signer_address")?.to_string();
    let raw = match (
        opt_str_param(params, "signature")?,
        opt_str_param(params, "private_key")?,
    ) {
        (Some(sig), None) => sig,
        (None, Some(key)) => key,
        _ => {
            return Err(RpcError::invalid_params(
                "exactly one of signature or private_key required",
            ))
        }
    };
    let credential = SignCredential::parse(raw)?;

    let outcome = with_engine(state, move |engine| {
        engine.sign_access_request(&request_id, &signer, &credential)
    })
    .await?;

    let request = &outcome.request;
    if outcome.recorded {
        state.event_bus.emit(
            EventType::AccessRequestSigned,
            json!({
                "request_id": request.request_id,
                "patient_id": request.patient_id,
                "missing": request.missing_roles(),
            }),
        );
    }
    if outcome.newly_approved {
        state.event_bus.emit(
            EventType::AccessRequestApproved,
            json!({ "request_id": request.request_id, "patient_id": request.patient_id }),
        );
    }

    Ok(json!({
        "approved": outcome.approved(),
        "message": outcome.message(),
        "status": request.status,
        "missing": request.missing_roles(),
    }))
}

/// A request with lazy expiry applied.
pub async fn get_access_request(state: &Arc<NodeState>, params: &Value) -> Result {
    let request_id = str_param(params, "request_id")?.to_string();
    let request = with_engine(state, move |engine| engine.get_access_request(&request_id)).await?;
    Ok(json!(request))
}

/// Every request about a patient, oldest first.
pub async fn list_access_requests(state: &Arc<NodeState>, params: &Value) -> Result {
    let patient_id = str_param(params, "patient_id")?.to_string();
    let requests =
        with_engine(state, move |engine| Ok(engine.access_requests_for_patient(&patient_id))).await?;
    Ok(json!(requests))
}
