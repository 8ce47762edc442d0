//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Engine calls
//! touch SQLite, so they run on the blocking pool.

pub mod access;
pub mod identity;
pub mod ledger;
pub mod records;

use std::sync::Arc;

use serde_json::Value;

use meditrust_crypto::ed25519::is_valid_address;
use meditrust_engine::Engine;

use crate::rpc::RpcError;
use crate::NodeState;

type Result = std::result::Result<Value, RpcError>;

/// Run `f` against the engine on the blocking pool.
async fn with_engine<T, F>(state: &Arc<NodeState>, f: F) -> std::result::Result<T, RpcError>
where
    F: FnOnce(&Engine) -> meditrust_engine::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| RpcError::internal_error(&format!("engine task failed: {e}")))?
        .map_err(RpcError::from)
}

/// A required string parameter.
fn str_param<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// A required address parameter: `mt` followed by 40 hex characters.
fn address_param<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    let address = str_param(params, key)?;
    if !is_valid_address(address) {
        return Err(RpcError::invalid_params(&format!("{key} is not an address")));
    }
    Ok(address)
}

/// An optional boolean flag; absent means false.
fn flag_param(params: &Value, key: &str) -> std::result::Result<bool, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(RpcError::invalid_params(&format!("{key} must be a boolean"))),
    }
}

/// An optional string parameter. Blank strings count as absent.
fn opt_str_param<'a>(params: &'a Value, key: &str) -> std::result::Result<Option<&'a str>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(RpcError::invalid_params(&format!("{key} must be a string"))),
    }
}

/// A required parameter parsed with [`std::str::FromStr`].
fn parsed_param<T>(params: &Value, key: &str) -> std::result::Result<T, RpcError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    str_param(params, key)?
        .parse()
        .map_err(|e: T::Err| RpcError::invalid_params(&format!("{key}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use meditrust_engine::{EngineConfig, ManualClock};
    use meditrust_types::ApprovalPolicy;

    use crate::config::NodeConfig;

    pub(crate) fn state(policy: ApprovalPolicy) -> Arc<NodeState> {
        let config = EngineConfig {
            approval_policy: policy,
            ..EngineConfig::default()
        };
        let engine = Engine::ephemeral(config, Arc::new(ManualClock::new(1_700_000_000)));
        Arc::new(NodeState::new(engine, NodeConfig::default()))
    }

    #[test]
    fn test_param_helpers() {
        let params = serde_json::json!({"a": "x", "blank": " ", "n": 3, "level": "PRIVATE"});
        assert_eq!(str_param(&params, "a").expect("a"), "x");
        assert!(str_param(&params, "missing").is_err());
        assert_eq!(opt_str_param(&params, "blank").expect("blank"), None);
        assert_eq!(opt_str_param(&params, "missing").expect("missing"), None);
        assert!(opt_str_param(&params, "n").is_err());

        let level: meditrust_types::AccessLevel = parsed_param(&params, "level").expect("level");
        assert_eq!(level, meditrust_types::AccessLevel::Private);
        assert!(parsed_param::<meditrust_types::AccessLevel>(&params, "a").is_err());
    }

    #[test]
    fn test_address_and_flag_params() {
        let good = format!("mt{}", "ab".repeat(20));
        let params = serde_json::json!({
            "good": good,
            "short": "mt1234",
            "prefix": format!("xx{}", "ab".repeat(20)),
            "strict": true,
            "n": 1,
        });
        assert_eq!(address_param(&params, "good").expect("good"), good);
        for key in ["short", "prefix", "missing"] {
            assert_eq!(address_param(&params, key).expect_err(key).code, -32602);
        }

        assert!(flag_param(&params, "strict").expect("strict"));
        assert!(!flag_param(&params, "missing").expect("missing"));
        assert!(flag_param(&params, "n").is_err());
    }
}
