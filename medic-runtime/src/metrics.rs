//! Metrics instrumentation for runtime observability.

use crate::loop_state::TerminationReason;
use medic_tools::Verdict;
use std::time::Instant;

pub const BACKEND_LATENCY: &str = "backend_request_latency";
pub const STEP_LATENCY: &str = "loop_step_latency";

/// Record reasoning backend latency.
pub fn record_backend_latency(duration_ms: f64) {
    metrics::histogram!("backend_request_latency", duration_ms);
}

/// Record the latency of one full loop step.
pub fn record_step_latency(duration_ms: f64) {
    metrics::histogram!("loop_step_latency", duration_ms);
}

/// Count a classifier verdict.
pub fn increment_verdict(verdict: &Verdict) {
    match verdict {
        Verdict::Allowed => metrics::counter!("verdict_allowed", 1),
        Verdict::RequiresApproval(_) => metrics::counter!("verdict_requires_approval", 1),
        Verdict::Blocked(_) => metrics::counter!("verdict_blocked", 1),
    }
}

/// Count a loop termination.
pub fn increment_termination(reason: TerminationReason) {
    match reason {
        TerminationReason::RootCauseFound => metrics::counter!("loop_root_cause_found", 1),
        TerminationReason::MaxStepsReached => metrics::counter!("loop_max_steps_reached", 1),
        TerminationReason::UserIdle => metrics::counter!("loop_user_idle", 1),
        TerminationReason::BackendUnreachable => metrics::counter!("loop_backend_unreachable", 1),
    }
}

/// RAII timer for automatic metric recording.
pub struct MetricTimer {
    start: Instant,
    metric_name: &'static str,
}

impl MetricTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        match self.metric_name {
            BACKEND_LATENCY => record_backend_latency(duration_ms),
            STEP_LATENCY => record_step_latency(duration_ms),
            _ => {}
        }
    }
}
