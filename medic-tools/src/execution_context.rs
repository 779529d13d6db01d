use serde::{Deserialize, Serialize};

/// Hard wall-clock limit for read-only query skills.
pub const QUERY_TIMEOUT_MS: u64 = 30_000;
/// Upper bound for approved, state-changing actions.
pub const MAX_ACTION_TIMEOUT_MS: u64 = 60_000;
/// Cap on captured bytes per output stream.
pub const OUTPUT_CAP_BYTES: usize = 1024 * 1024;

/// Limits and correlation id for one process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub invocation_id: String,
    pub timeout_ms: u64,
    pub output_cap_bytes: usize,
}

impl ExecutionContext {
    /// Limits above the hard ceilings are clamped down to them.
    pub fn new(timeout_ms: u64, output_cap_bytes: usize) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            timeout_ms: timeout_ms.min(MAX_ACTION_TIMEOUT_MS),
            output_cap_bytes: output_cap_bytes.min(OUTPUT_CAP_BYTES),
        }
    }
}

/// Dispatcher-wide limits, usually taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchLimits {
    pub query_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub output_cap_bytes: usize,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            query_timeout_ms: QUERY_TIMEOUT_MS,
            action_timeout_ms: MAX_ACTION_TIMEOUT_MS,
            output_cap_bytes: OUTPUT_CAP_BYTES,
        }
    }
}
