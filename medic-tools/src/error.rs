use crate::platform::Platform;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown skill: {0}")]
    SkillNotFound(String),

    #[error("Duplicate skill id: {0}")]
    DuplicateSkill(String),

    #[error("Skill {skill} is not supported on {platform}")]
    PlatformUnsupported { skill: String, platform: Platform },

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter {name} expects {expected}, got {value:?}")]
    InvalidParameter {
        name: String,
        expected: &'static str,
        value: String,
    },

    #[error("Failed to start process: {0}")]
    SpawnFailed(String),

    #[error("Output exceeded {0} bytes")]
    OutputLimitExceeded(usize),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
