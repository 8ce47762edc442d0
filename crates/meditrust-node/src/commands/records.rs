//! Health record command handlers.

use std::sync::Arc;

use serde_json::{json, Value};

use meditrust_engine::HealthRecord;
use meditrust_types::{AccessLevel, EventType};

use super::{address_param, opt_str_param, parsed_param, str_param, with_engine, Result};
use crate::rpc::RpcError;
use crate::NodeState;

/// Append a record to the ledger.
pub async fn add_health_data(state: &Arc<NodeState>, params: &Value) -> Result {
    let data = params
        .get("data")
        .cloned()
        .ok_or_else(|| RpcError::invalid_params("data required"))?;
    let expiry_years = match params.get("expiry_years") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_u64()
                .and_then(|y| u32::try_from(y).ok())
                .ok_or_else(|| RpcError::invalid_params("expiry_years must be a whole number"))?,
        ),
    };
    let access_level: AccessLevel = parsed_param(params, "access_level")?;

    let record = HealthRecord {
        patient_id: str_param(params, "patient_id")?.to_string(),
        data,
        access_level,
        creator_address: address_param(params, "creator_address")?.to_string(),
        expiry_years,
    };

    let block = with_engine(state, move |engine| engine.add_health_data(record)).await?;

    state.event_bus.emit(
        EventType::BlockAppended,
        json!({
            "index": block.index,
            "patient_id": block.patient_id,
            "access_level": block.access_level,
            "created_by": block.created_by,
        }),
    );

    Ok(json!({
        "index": block.index,
        "hash": block.hash_hex(),
        "expiry_date": block.expiry_date,
    }))
}

/// A patient's records, bucketed by what the requester may see.
pub async fn get_patient_data(state: &Arc<NodeState>, params: &Value) -> Result {
    let patient_id = str_param(params, "patient_id")?.to_string();
    let requester = address_param(params, "requester_address")?.to_string();
    let request_id = opt_str_param(params, "request_id")?.map(str::to_string);

    let data = with_engine(state, move |engine| {
        engine.get_patient_data(&patient_id, &requester, request_id.as_deref())
    })
    .await?;
    Ok(json!(data))
}
