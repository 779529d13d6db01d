pub mod audit;
pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod execution_context;
pub mod platform;
pub mod policy;
pub mod registry;
pub mod request;
pub mod runner;
pub mod sanitize;
pub mod skill;
pub mod traits;

pub use audit::{AuditRecord, AuditTrail, AUDIT_CAPACITY};
pub use catalog::{builtin_registry, builtin_skills};
pub use dispatcher::{CommandDispatcher, ErrorKind, ExecutionResult};
pub use error::ToolError;
pub use execution_context::{DispatchLimits, ExecutionContext};
pub use platform::{CommandTemplates, Platform};
pub use policy::{Approval, AuthorizedAction, AuthorizedCommand, SafetyClassifier, Verdict};
pub use registry::{SkillRegistry, SkillRegistryBuilder};
pub use request::ActionRequest;
pub use runner::ShellRunner;
pub use skill::{Params, RiskClass, Skill, SkillKind, SkillParameter};
pub use traits::{AuditSink, CommandRunner, ProcessOutput};
