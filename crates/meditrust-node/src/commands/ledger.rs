//! Ledger audit and node status handlers.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use meditrust_engine::Engine;
use meditrust_types::EventType;

use super::{flag_param, with_engine, Result};
use crate::NodeState;

/// Recompute every hash and link.
///
/// With `"strict": true` a failed audit is returned as a `CHAIN_INTEGRITY`
/// error instead of a report. The event is emitted either way.
pub async fn verify_chain(state: &Arc<NodeState>, params: &Value) -> Result {
    let strict = flag_param(params, "strict")?;
    let report = with_engine(state, |engine| Ok(engine.verify_chain())).await?;
    if !report.valid {
        warn!(first_invalid_index = ?report.first_invalid_index, "chain verification failed");
    }
    state.event_bus.emit(EventType::ChainVerified, json!(report));
    if strict {
        Engine::check_chain(&report)?;
    }
    Ok(json!(report))
}

/// Count blocks past their expiry date.
pub async fn scan_expired(state: &Arc<NodeState>) -> Result {
    let scan = with_engine(state, |engine| Ok(engine.scan_expired())).await?;
    Ok(json!(scan))
}

pub async fn get_node_status(state: &Arc<NodeState>) -> Result {
    let status = with_engine(state, |engine| Ok(engine.status())).await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "events_emitted": state.event_bus.sequence(),
        "data_dir": state.config.data_dir(),
    }))
}
