use crate::audit::AuditRecord;
use crate::error::ToolError;
use crate::execution_context::{DispatchLimits, ExecutionContext};
use crate::platform::Platform;
use crate::policy::{AuthorizedAction, AuthorizedCommand};
use crate::sanitize::sanitize_name;
use crate::skill::{RiskClass, SkillKind};
use crate::traits::{AuditSink, CommandRunner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Audit action type used for free-form commands run through `execute_raw`.
pub const RAW_COMMAND_ACTION: &str = "raw-command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    None,
    Timeout,
    PlatformUnsupported,
    Blocked,
    RuntimeError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub error_kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn ok(output: impl Into<String>, stderr: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            stderr: stderr.into(),
            error_kind: ErrorKind::None,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            stderr: String::new(),
            error_kind: kind,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Synthetic result for an action that never reached the dispatcher.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::failure(ErrorKind::Blocked, reason)
    }

    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Executes authorized actions. Every call spawns at most one process and
/// appends exactly one audit record.
pub struct CommandDispatcher {
    runner: Arc<dyn CommandRunner>,
    audit: Arc<dyn AuditSink>,
    limits: DispatchLimits,
}

impl CommandDispatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        audit: Arc<dyn AuditSink>,
        limits: DispatchLimits,
    ) -> Self {
        Self {
            runner,
            audit,
            limits,
        }
    }

    pub fn limits(&self) -> DispatchLimits {
        self.limits
    }

    pub async fn execute(&self, action: &AuthorizedAction, platform: Platform) -> ExecutionResult {
        let skill = action.skill();
        info!("Dispatching {} on {}", skill.id, platform);

        let command = match self.prepare(action, platform) {
            Ok(command) => command,
            Err(e) => {
                let kind = match e {
                    ToolError::PlatformUnsupported { .. } => ErrorKind::PlatformUnsupported,
                    _ => ErrorKind::RuntimeError,
                };
                warn!("Not dispatching {}: {}", skill.id, e);
                let result = ExecutionResult::failure(kind, e.to_string());
                self.record(&skill.id, "", &result);
                return result;
            }
        };

        let timeout_ms = match skill.risk {
            RiskClass::Safe => self.limits.query_timeout_ms,
            _ => self.limits.action_timeout_ms,
        };
        let ctx = ExecutionContext::new(timeout_ms, self.limits.output_cap_bytes);
        let result = self.run(platform, &command, &ctx).await;
        self.record(&skill.id, &command, &result);
        result
    }

    pub async fn execute_raw(
        &self,
        command: &AuthorizedCommand,
        timeout_ms: u64,
        output_cap_bytes: usize,
    ) -> ExecutionResult {
        let command = command.command();
        info!("Dispatching raw command");
        let ctx = ExecutionContext::new(timeout_ms, output_cap_bytes);
        let result = self.run(Platform::current(), command, &ctx).await;
        self.record(RAW_COMMAND_ACTION, command, &result);
        result
    }

    fn prepare(&self, action: &AuthorizedAction, platform: Platform) -> Result<String, ToolError> {
        let skill = action.skill();
        let params = skill.bind(action.params())?;
        let template = skill.template_for(&params, platform)?;

        if let SkillKind::ProcessTarget { param } = &skill.kind {
            let target = params.get(param).map(String::as_str).unwrap_or_default();
            if sanitize_name(target).is_empty() {
                return Err(ToolError::InvalidParameter {
                    name: param.clone(),
                    expected: "a process name",
                    value: target.to_string(),
                });
            }
        }

        Ok(skill.render(template, &params, platform))
    }

    async fn run(
        &self,
        platform: Platform,
        command: &str,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let started = Instant::now();
        let outcome = self.runner.run(platform, command, ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("dispatch_latency", duration_ms as f64);

        let result = match outcome {
            Ok(output) if output.success() => {
                ExecutionResult::ok(output.stdout.trim(), output.stderr, duration_ms)
            }
            Ok(output) => {
                let error = match output.exit_code {
                    Some(code) => format!("Command exited with status {code}"),
                    None => "Command terminated by signal".to_string(),
                };
                ExecutionResult {
                    success: false,
                    output: output.stdout.trim().to_string(),
                    stderr: output.stderr,
                    error_kind: ErrorKind::RuntimeError,
                    error: Some(error),
                    duration_ms,
                }
            }
            Err(e @ (ToolError::Timeout(_) | ToolError::OutputLimitExceeded(_))) => {
                ExecutionResult::failure(ErrorKind::Timeout, e.to_string())
                    .with_duration(duration_ms)
            }
            Err(e) => {
                error!("Command failed to run [{}]: {}", ctx.invocation_id, e);
                ExecutionResult::failure(ErrorKind::RuntimeError, e.to_string())
                    .with_duration(duration_ms)
            }
        };
        info!(
            "Command finished in {}ms (success: {}) [{}]",
            duration_ms, result.success, ctx.invocation_id
        );
        result
    }

    fn record(&self, action_type: &str, command: &str, result: &ExecutionResult) {
        let message = if result.success {
            None
        } else {
            result.error.clone()
        };
        self.audit
            .append(AuditRecord::new(action_type, command, result.success, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditTrail;
    use crate::catalog::builtin_registry;
    use crate::policy::{Approval, SafetyClassifier};
    use crate::request::ActionRequest;
    use crate::skill::Params;
    use crate::traits::ProcessOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubRunner {
        calls: AtomicUsize,
        commands: Mutex<Vec<String>>,
        reply: fn() -> Result<ProcessOutput, ToolError>,
    }

    impl StubRunner {
        fn new(reply: fn() -> Result<ProcessOutput, ToolError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                commands: Mutex::new(Vec::new()),
                reply,
            })
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(
            &self,
            _platform: Platform,
            command: &str,
            _ctx: &ExecutionContext,
        ) -> Result<ProcessOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.commands.lock().unwrap().push(command.to_string());
            (self.reply)()
        }
    }

    fn exit_ok() -> Result<ProcessOutput, ToolError> {
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: "  done\n".into(),
            stderr: String::new(),
        })
    }

    fn exit_two() -> Result<ProcessOutput, ToolError> {
        Ok(ProcessOutput {
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "no such process".into(),
        })
    }

    fn timed_out() -> Result<ProcessOutput, ToolError> {
        Err(ToolError::Timeout(30_000))
    }

    fn authorize(pairs: &[(&str, &str)], skill_id: &str) -> AuthorizedAction {
        let classifier = SafetyClassifier::new(Arc::new(builtin_registry().unwrap()));
        let params: Params = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        classifier
            .authorize(&ActionRequest::new(skill_id, params), Approval::Granted)
            .unwrap()
    }

    fn dispatcher(runner: Arc<StubRunner>, audit: Arc<AuditTrail>) -> CommandDispatcher {
        CommandDispatcher::new(runner, audit, DispatchLimits::default())
    }

    #[tokio::test]
    async fn test_success_trims_stdout_and_audits() {
        let runner = StubRunner::new(exit_ok);
        let audit = Arc::new(AuditTrail::new());
        let action = authorize(&[("queryType", "uptime")], "query-system");
        let result = dispatcher(runner.clone(), audit.clone())
            .execute(&action, Platform::Linux)
            .await;

        assert!(result.success);
        assert_eq!(result.output, "done");
        assert_eq!(result.error_kind, ErrorKind::None);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        let records = audit.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action_type, "query-system");
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_runtime_error() {
        let runner = StubRunner::new(exit_two);
        let audit = Arc::new(AuditTrail::new());
        let action = authorize(&[("processName", "ghost")], "kill-process");
        let result = dispatcher(runner, audit.clone())
            .execute(&action, Platform::Linux)
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, ErrorKind::RuntimeError);
        assert_eq!(result.stderr, "no such process");
        assert_eq!(
            audit.snapshot()[0].error_message.as_deref(),
            Some("Command exited with status 2")
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_kind() {
        let runner = StubRunner::new(timed_out);
        let audit = Arc::new(AuditTrail::new());
        let action = authorize(&[("queryType", "uptime")], "query-system");
        let result = dispatcher(runner, audit).execute(&action, Platform::Linux).await;
        assert_eq!(result.error_kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_empty_process_name_never_spawns() {
        let runner = StubRunner::new(exit_ok);
        let audit = Arc::new(AuditTrail::new());
        let action = authorize(&[("processName", ";;|&")], "kill-process");
        let result = dispatcher(runner.clone(), audit.clone())
            .execute(&action, Platform::Linux)
            .await;

        assert_eq!(result.error_kind, ErrorKind::RuntimeError);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_parameter_never_spawns() {
        let runner = StubRunner::new(exit_ok);
        let audit = Arc::new(AuditTrail::new());
        let action = authorize(&[], "kill-process");
        let result = dispatcher(runner.clone(), audit)
            .execute(&action, Platform::Linux)
            .await;

        assert_eq!(result.error_kind, ErrorKind::RuntimeError);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raw_command_is_audited_under_raw_type() {
        let runner = StubRunner::new(exit_ok);
        let audit = Arc::new(AuditTrail::new());
        let classifier = SafetyClassifier::new(Arc::new(builtin_registry().unwrap()));
        let command = classifier
            .authorize_command("ls ~/Downloads", Approval::Granted)
            .unwrap();
        let result = dispatcher(runner.clone(), audit.clone())
            .execute_raw(&command, 5_000, 1024)
            .await;

        assert!(result.success);
        assert_eq!(runner.commands.lock().unwrap()[0], "ls ~/Downloads");
        assert_eq!(audit.snapshot()[0].action_type, RAW_COMMAND_ACTION);
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::PlatformUnsupported).unwrap();
        assert_eq!(json, "\"platform-unsupported\"");
    }
}
