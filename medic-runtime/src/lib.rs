//! Medic runtime core.
//!
//! Turns free-text backend replies into classified, bounded actions and
//! drives the diagnose, act, reinterpret loop around them.

pub mod action_parser;
pub mod checklist;
pub mod compactor;
pub mod config;
pub mod interfaces;
pub mod llm_client;
pub mod loop_state;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod system_result;
pub mod types;

pub use action_parser::{parse, ParsedResponse};
pub use checklist::{Checklist, ChecklistItem};
pub use compactor::Compactor;
pub use config::{load_config, BackendConfig, MedicConfig};
pub use interfaces::{ReasoningBackend, RuntimeError};
pub use llm_client::LLMClient;
pub use loop_state::{LoopPhase, LoopState, TerminationReason, MAX_STEPS, MAX_STEPS_MESSAGE};
pub use orchestrator::{LoopEvent, LoopOutcome, LoopReport, Orchestrator};
pub use prompt::{build_system_prompt, DEFAULT_INSTRUCTIONS};
pub use system_result::format_system_result;
pub use types::{Message, Role};
