#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use medic_runtime::*;
use medic_tools::{
    builtin_registry, AuditTrail, CommandDispatcher, CommandRunner, DispatchLimits, ErrorKind,
    ExecutionContext, Platform, ProcessOutput, SafetyClassifier, ToolError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replies from a fixed script and remembers every transcript it was shown.
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            transcripts: Mutex::new(Vec::new()),
        })
    }

    fn last_user_message(&self) -> String {
        let transcripts = self.transcripts.lock().unwrap();
        transcripts
            .last()
            .and_then(|t| t.iter().rev().find(|m| m.role == Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn longest_transcript(&self) -> usize {
        self.transcripts.lock().unwrap().iter().map(Vec::len).max().unwrap_or(0)
    }

    fn calls(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[Message],
    ) -> Result<String, RuntimeError> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RuntimeError::BackendUnreachable("script exhausted".to_string()))
    }
}

struct StubRunner {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for StubRunner {
    async fn run(
        &self,
        _platform: Platform,
        command: &str,
        _ctx: &ExecutionContext,
    ) -> Result<ProcessOutput, ToolError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: "USER PID %MEM COMMAND\nalice 4242 31.0 chrome\nalice 777 12.5 slack\n"
                .to_string(),
            stderr: String::new(),
        })
    }
}

struct World {
    orchestrator: Arc<Orchestrator>,
    backend: Arc<ScriptedBackend>,
    runner: Arc<StubRunner>,
    audit: Arc<AuditTrail>,
}

fn world(replies: &[&str]) -> World {
    let registry = Arc::new(builtin_registry().unwrap());
    let backend = ScriptedBackend::new(replies);
    let runner = Arc::new(StubRunner {
        commands: Mutex::new(Vec::new()),
    });
    let audit = Arc::new(AuditTrail::new());
    let dispatcher = Arc::new(CommandDispatcher::new(
        runner.clone(),
        audit.clone(),
        DispatchLimits::default(),
    ));
    let prompt = build_system_prompt(DEFAULT_INSTRUCTIONS, &registry, Platform::Linux);
    let orchestrator = Orchestrator::new(
        backend.clone(),
        Arc::new(SafetyClassifier::new(registry)),
        dispatcher,
        audit.clone(),
        prompt,
    )
    .with_platform(Platform::Linux);
    World {
        orchestrator: Arc::new(orchestrator),
        backend,
        runner,
        audit,
    }
}

#[tokio::test]
async fn test_diagnose_then_conclude() {
    let w = world(&[
        "Let me look at memory.\n- [ ] Find the heaviest process\n[ACTION: type=\"query-system\" queryType=\"top-processes\"]",
        "- [x] Find the heaviest process\nChrome is using 31% of memory.",
    ]);
    let report = w.orchestrator.handle_message("desk", "my laptop is slow").await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Concluded);
    assert_eq!(report.step_count, 1);
    assert_eq!(
        w.runner.commands.lock().unwrap().as_slice(),
        ["ps aux --sort=-%mem | head -10"]
    );

    let feedback = w.backend.last_user_message();
    assert!(feedback.starts_with("[SYSTEM_RESULT: queryType=\"top-processes\" output=\"USER PID"));
    assert!(!feedback.contains("error="));

    match &report.events[0] {
        LoopEvent::Reply(text) => assert!(!text.contains("[ACTION:")),
        other => panic!("unexpected event: {:?}", other),
    }
    let state = w.orchestrator.snapshot("desk").await.unwrap();
    assert_eq!(state.checklist.pending(), 0);
    assert_eq!(state.termination, Some(TerminationReason::RootCauseFound));
}

#[tokio::test]
async fn test_approval_flow_runs_sanitized_command() {
    let w = world(&[
        "Chrome looks stuck.\n[ACTION: type=\"kill-process\" processName=\"Chrome;rm -rf ~\"]",
        "Chrome has been stopped.",
    ]);
    let report = w.orchestrator.handle_message("desk", "chrome froze").await.unwrap();
    let LoopOutcome::AwaitingApproval { request, reason } = report.outcome else {
        panic!("expected approval request");
    };
    assert!(!reason.is_empty());
    assert!(w.runner.commands.lock().unwrap().is_empty());

    let state = w.orchestrator.snapshot("desk").await.unwrap();
    assert_eq!(state.phase, LoopPhase::AwaitingApproval);
    assert_eq!(state.pending.as_ref(), Some(&request));

    let report = w.orchestrator.approve("desk", &request).await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::Concluded);
    assert_eq!(
        w.runner.commands.lock().unwrap().as_slice(),
        ["pkill -f Chromerm-rf"]
    );
    assert_eq!(w.audit.snapshot()[0].command_text, "pkill -f Chromerm-rf");

    // A second approval of the same request has nothing to resume.
    assert!(w.orchestrator.approve("desk", &request).await.is_err());
}

#[tokio::test]
async fn test_decline_is_fed_back_as_failure() {
    let w = world(&[
        "[ACTION: type=\"flush-dns\"]",
        "Understood, leaving DNS alone.",
    ]);
    let report = w.orchestrator.handle_message("desk", "sites won't load").await.unwrap();
    assert!(matches!(report.outcome, LoopOutcome::AwaitingApproval { .. }));

    let report = w.orchestrator.decline("desk").await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::Concluded);
    assert_eq!(report.step_count, 1);
    assert!(w.runner.commands.lock().unwrap().is_empty());

    let feedback = w.backend.last_user_message();
    assert_eq!(
        feedback,
        "[SYSTEM_RESULT: queryType=\"flush-dns\" output=\"\" error=\"declined by user\"]"
    );
    let records = w.audit.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_message.as_deref(), Some("declined by user"));
}

#[tokio::test]
async fn test_dangerous_shell_text_never_asks_for_approval() {
    let w = world(&[
        "[ACTION: type=\"run-command\" command=\"sudo rm -rf /\"]",
        "That command is not allowed.",
    ]);
    let report = w.orchestrator.handle_message("desk", "clean everything").await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::Concluded);
    assert!(w.runner.commands.lock().unwrap().is_empty());

    let result = report
        .events
        .iter()
        .find_map(|e| match e {
            LoopEvent::Result { result, .. } => Some(result),
            _ => None,
        })
        .unwrap();
    assert_eq!(result.error_kind, ErrorKind::Blocked);
    assert!(w
        .backend
        .last_user_message()
        .contains("error=\"blocked for security reasons\""));
}

#[tokio::test]
async fn test_ten_action_replies_terminate() {
    let action = "[ACTION: type=\"query-system\" queryType=\"uptime\"]";
    let mut script = vec![action; MAX_STEPS as usize];
    script.push("Fresh start, nothing to run.");
    let w = world(&script);

    let report = w.orchestrator.handle_message("desk", "keep digging").await.unwrap();
    match &report.outcome {
        LoopOutcome::Terminated { reason, message } => {
            assert_eq!(*reason, TerminationReason::MaxStepsReached);
            assert_eq!(message, MAX_STEPS_MESSAGE);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(report.step_count, MAX_STEPS);
    assert_eq!(w.runner.commands.lock().unwrap().len(), MAX_STEPS as usize);
    assert_eq!(w.backend.calls(), MAX_STEPS as usize);

    // A new top-level message starts over from step zero.
    let report = w.orchestrator.handle_message("desk", "new problem").await.unwrap();
    assert_eq!(report.outcome, LoopOutcome::Concluded);
    assert_eq!(report.step_count, 0);
}

#[tokio::test]
async fn test_backend_loss_surfaces_error() {
    let w = world(&["[ACTION: type=\"query-system\" queryType=\"uptime\"]"]);
    let result = w.orchestrator.handle_message("desk", "hello").await;
    assert!(matches!(result, Err(RuntimeError::BackendUnreachable(_))));

    let state = w.orchestrator.snapshot("desk").await.unwrap();
    assert_eq!(state.phase, LoopPhase::Failed);
    assert_eq!(state.termination, Some(TerminationReason::BackendUnreachable));
    assert_eq!(state.step_count, MAX_STEPS);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let w = world(&[
        "[ACTION: type=\"kill-process\" processName=\"slack\"]",
        "Nothing wrong here.",
    ]);
    let first = w.orchestrator.handle_message("alice", "slack").await.unwrap();
    assert!(matches!(first.outcome, LoopOutcome::AwaitingApproval { .. }));

    let second = w.orchestrator.handle_message("bob", "hello").await.unwrap();
    assert_eq!(second.outcome, LoopOutcome::Concluded);

    let alice = w.orchestrator.snapshot("alice").await.unwrap();
    assert_eq!(alice.phase, LoopPhase::AwaitingApproval);
    assert_eq!(w.orchestrator.session_count(), 2);
    assert!(w.orchestrator.end_session("alice"));
    assert!(w.orchestrator.snapshot("alice").await.is_none());
}

#[tokio::test]
async fn test_long_running_session_history_is_bounded() {
    let script = vec!["Looks fine."; 500];
    let w = world(&script);
    for i in 0..500 {
        let report = w
            .orchestrator
            .handle_message("desk", &format!("question {i}"))
            .await
            .unwrap();
        assert_eq!(report.outcome, LoopOutcome::Concluded);
    }

    assert_eq!(w.backend.calls(), 500);
    assert!(w.backend.longest_transcript() <= medic_runtime::compactor::DEFAULT_MAX_MESSAGES);
    assert_eq!(w.backend.last_user_message(), "question 499");
}
