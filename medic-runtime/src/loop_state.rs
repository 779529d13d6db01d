//! Per-session state of the diagnose, act, reinterpret loop.

use crate::checklist::Checklist;
use medic_tools::{ActionRequest, ExecutionResult};
use serde::Serialize;

pub const MAX_STEPS: u32 = 10;

/// Emitted instead of an eleventh dispatch.
pub const MAX_STEPS_MESSAGE: &str = "I've reached the maximum number of diagnostic steps (10) for this request. \
Here is where things stand: review the checklist and the results above, then send a new message if you'd like me to keep investigating.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopPhase {
    Idle,
    Planning,
    Executing,
    Interpreting,
    AwaitingApproval,
    Concluded,
    Terminated,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    RootCauseFound,
    MaxStepsReached,
    UserIdle,
    BackendUnreachable,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopState {
    pub step_count: u32,
    pub checklist: Checklist,
    pub last_result: Option<ExecutionResult>,
    pub termination: Option<TerminationReason>,
    pub phase: LoopPhase,
    pub pending: Option<ActionRequest>,
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            step_count: 0,
            checklist: Checklist::new(),
            last_result: None,
            termination: None,
            phase: LoopPhase::Idle,
            pending: None,
        }
    }

    /// Start over for a new top-level user message.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn steps_exhausted(&self) -> bool {
        self.step_count >= MAX_STEPS
    }

    /// Count one completed step. Never moves past `MAX_STEPS`.
    pub fn advance(&mut self) {
        self.step_count = (self.step_count + 1).min(MAX_STEPS);
    }

    pub fn terminate(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
        self.pending = None;
        self.phase = match reason {
            TerminationReason::RootCauseFound => LoopPhase::Concluded,
            TerminationReason::BackendUnreachable => {
                self.step_count = MAX_STEPS;
                LoopPhase::Failed
            }
            TerminationReason::MaxStepsReached | TerminationReason::UserIdle => {
                LoopPhase::Terminated
            }
        };
    }
}
