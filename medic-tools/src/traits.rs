use crate::audit::AuditRecord;
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::platform::Platform;
use async_trait::async_trait;

/// Raw output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a fully rendered command line. Implementations must enforce the
/// timeout and output cap carried by the context and kill the process when
/// either is exceeded.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        platform: Platform,
        command: &str,
        ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, ToolError>;
}

/// Destination for audit records. Shared by every session in the process.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}
