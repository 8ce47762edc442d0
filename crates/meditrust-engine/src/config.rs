//! Engine tunables.

use serde::{Deserialize, Serialize};

use meditrust_types::{ApprovalPolicy, DEFAULT_EXPIRY_YEARS};

/// Default time-to-live of a pending access request.
pub const DEFAULT_REQUEST_TTL_HOURS: u64 = 72;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Record lifetime when a caller does not give one.
    pub default_expiry_years: u32,
    pub request_ttl_secs: u64,
    pub approval_policy: ApprovalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_expiry_years: DEFAULT_EXPIRY_YEARS,
            request_ttl_secs: DEFAULT_REQUEST_TTL_HOURS * 3600,
            approval_policy: ApprovalPolicy::default(),
        }
    }
}
