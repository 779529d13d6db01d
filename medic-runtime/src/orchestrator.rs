//! Orchestration loop - the bounded diagnose, act, reinterpret cycle.

use crate::action_parser::parse;
use crate::compactor::Compactor;
use crate::interfaces::{ReasoningBackend, RuntimeError};
use crate::loop_state::{LoopPhase, LoopState, TerminationReason, MAX_STEPS_MESSAGE};
use crate::metrics::{self, MetricTimer, STEP_LATENCY};
use crate::system_result::format_system_result;
use crate::types::Message;
use medic_tools::{
    ActionRequest, Approval, AuditRecord, AuditSink, CommandDispatcher, ExecutionResult,
    Platform, SafetyClassifier, Verdict,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DECLINED_BY_USER: &str = "declined by user";

/// Something the caller should show, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Backend text with action tags removed.
    Reply(String),
    /// An action that was run, refused or declined.
    Result {
        request: ActionRequest,
        result: ExecutionResult,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The backend answered without requesting an action.
    Concluded,
    /// The loop is suspended until `approve` or `decline`.
    AwaitingApproval {
        request: ActionRequest,
        reason: String,
    },
    Terminated {
        reason: TerminationReason,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub events: Vec<LoopEvent>,
    pub outcome: LoopOutcome,
    pub step_count: u32,
}

struct Session {
    state: LoopState,
    history: Vec<Message>,
    last_activity: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            state: LoopState::new(),
            history: Vec::new(),
            last_activity: Instant::now(),
        }
    }
}

/// Drives one loop per session. Steps within a session are serialized by a
/// per-session async mutex; distinct sessions run concurrently.
pub struct Orchestrator {
    backend: Arc<dyn ReasoningBackend>,
    classifier: Arc<SafetyClassifier>,
    dispatcher: Arc<CommandDispatcher>,
    audit: Arc<dyn AuditSink>,
    system_prompt: String,
    platform: Platform,
    idle_timeout: Duration,
    compactor: Compactor,
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Session>>>>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        classifier: Arc<SafetyClassifier>,
        dispatcher: Arc<CommandDispatcher>,
        audit: Arc<dyn AuditSink>,
        system_prompt: String,
    ) -> Self {
        Self {
            backend,
            classifier,
            dispatcher,
            audit,
            system_prompt,
            platform: Platform::current(),
            idle_timeout: Duration::from_secs(crate::config::DEFAULT_IDLE_TIMEOUT_SECS),
            compactor: Compactor::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_compactor(mut self, compactor: Compactor) -> Self {
        self.compactor = compactor;
        self
    }

    fn session(&self, session_id: &str) -> Arc<tokio::sync::Mutex<Session>> {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::new())))
            .clone()
    }

    fn existing_session(
        &self,
        session_id: &str,
    ) -> Result<Arc<tokio::sync::Mutex<Session>>, RuntimeError> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RuntimeError::SessionError(format!("Unknown session: {}", session_id)))
    }

    /// Start a fresh loop for a new top-level user message.
    pub async fn handle_message(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<LoopReport, RuntimeError> {
        let session = self.session(session_id);
        let mut session = session.lock().await;
        info!("New message for session: {}", session_id);

        session.state.reset();
        session.history.push(Message::user(user_message));
        session.last_activity = Instant::now();

        let mut events = Vec::new();
        self.run_loop(session_id, &mut session, &mut events).await
    }

    /// Resume a suspended loop with the identical request, now approved.
    pub async fn approve(
        &self,
        session_id: &str,
        request: &ActionRequest,
    ) -> Result<LoopReport, RuntimeError> {
        let session = self.existing_session(session_id)?;
        let mut session = session.lock().await;
        let pending = take_pending(&mut session.state, request)?;
        session.last_activity = Instant::now();
        info!("Approved {} for session: {}", pending.skill_id, session_id);

        session.state.phase = LoopPhase::Executing;
        let result = match self.classifier.authorize(&pending, Approval::Granted) {
            Ok(action) => self.dispatcher.execute(&action, self.platform).await,
            Err(verdict) => self.refuse(&pending, verdict.reason()),
        };

        let mut events = Vec::new();
        self.interpret(&mut session, pending, result, &mut events);
        self.run_loop(session_id, &mut session, &mut events).await
    }

    /// Resume a suspended loop, reporting the pending action as declined.
    pub async fn decline(&self, session_id: &str) -> Result<LoopReport, RuntimeError> {
        let session = self.existing_session(session_id)?;
        let mut session = session.lock().await;
        let pending = session.state.pending.take().ok_or_else(|| {
            RuntimeError::SessionError("No action is awaiting approval".to_string())
        })?;
        session.last_activity = Instant::now();
        info!("Declined {} for session: {}", pending.skill_id, session_id);

        let result = self.refuse(&pending, DECLINED_BY_USER);
        let mut events = Vec::new();
        self.interpret(&mut session, pending, result, &mut events);
        self.run_loop(session_id, &mut session, &mut events).await
    }

    /// Copy of a session's loop state.
    pub async fn snapshot(&self, session_id: &str) -> Option<LoopState> {
        let session = self.sessions.lock().get(session_id).cloned()?;
        let session = session.lock().await;
        Some(session.state.clone())
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Terminate and drop every session idle for longer than the idle
    /// timeout. Sessions in the middle of a step are skipped.
    pub fn expire_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        let mut expired = Vec::new();
        sessions.retain(|id, session| {
            let Ok(mut session) = session.try_lock() else {
                return true;
            };
            if session.last_activity.elapsed() < self.idle_timeout {
                return true;
            }
            session.state.terminate(TerminationReason::UserIdle);
            metrics::increment_termination(TerminationReason::UserIdle);
            expired.push(id.clone());
            false
        });
        for id in &expired {
            info!("Session expired after inactivity: {}", id);
        }
        expired
    }

    /// Run `expire_idle` every `interval` until the orchestrator is dropped.
    pub fn spawn_idle_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.expire_idle();
            }
        })
    }

    async fn run_loop(
        &self,
        session_id: &str,
        session: &mut Session,
        events: &mut Vec<LoopEvent>,
    ) -> Result<LoopReport, RuntimeError> {
        loop {
            if session.state.steps_exhausted() {
                warn!("Session {} reached the step limit", session_id);
                return Ok(self.finish(
                    session,
                    TerminationReason::MaxStepsReached,
                    MAX_STEPS_MESSAGE,
                    std::mem::take(events),
                ));
            }

            let _timer = MetricTimer::new(STEP_LATENCY);
            session.state.phase = LoopPhase::Planning;
            debug!(
                "Planning step {} for session {}",
                session.state.step_count + 1,
                session_id
            );

            self.compactor.compact(&mut session.history);
            let reply = match self
                .backend
                .complete(&self.system_prompt, &session.history)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Backend call failed for session {}: {}", session_id, e);
                    session.state.terminate(TerminationReason::BackendUnreachable);
                    metrics::increment_termination(TerminationReason::BackendUnreachable);
                    return Err(match e {
                        RuntimeError::BackendUnreachable(_) => e,
                        other => RuntimeError::BackendUnreachable(other.to_string()),
                    });
                }
            };

            session.history.push(Message::assistant(reply.as_str()));
            session.state.checklist.merge(&reply);
            let parsed = parse(&reply);
            events.push(LoopEvent::Reply(parsed.display_text));

            let mut actions = parsed.actions.into_iter();
            let Some(request) = actions.next() else {
                info!("Session {} concluded", session_id);
                session.state.terminate(TerminationReason::RootCauseFound);
                metrics::increment_termination(TerminationReason::RootCauseFound);
                return Ok(LoopReport {
                    events: std::mem::take(events),
                    outcome: LoopOutcome::Concluded,
                    step_count: session.state.step_count,
                });
            };
            let ignored = actions.count();
            if ignored > 0 {
                debug!("Ignoring {} additional action(s) in one reply", ignored);
            }

            let verdict = self.classifier.classify(&request);
            metrics::increment_verdict(&verdict);

            let result = match verdict {
                Verdict::Allowed => {
                    session.state.phase = LoopPhase::Executing;
                    match self.classifier.authorize(&request, Approval::NotGranted) {
                        Ok(action) => self.dispatcher.execute(&action, self.platform).await,
                        Err(verdict) => self.refuse(&request, verdict.reason()),
                    }
                }
                Verdict::RequiresApproval(reason) => {
                    info!(
                        "Session {} awaiting approval for {}",
                        session_id, request.skill_id
                    );
                    session.state.phase = LoopPhase::AwaitingApproval;
                    session.state.pending = Some(request.clone());
                    return Ok(LoopReport {
                        events: std::mem::take(events),
                        outcome: LoopOutcome::AwaitingApproval { request, reason },
                        step_count: session.state.step_count,
                    });
                }
                Verdict::Blocked(reason) => {
                    warn!("Blocked {} in session {}: {}", request.skill_id, session_id, reason);
                    self.refuse(&request, &reason)
                }
            };

            self.interpret(session, request, result, events);
        }
    }

    /// Feed a result back as `[SYSTEM_RESULT]` and count the step.
    fn interpret(
        &self,
        session: &mut Session,
        request: ActionRequest,
        result: ExecutionResult,
        events: &mut Vec<LoopEvent>,
    ) {
        session.state.phase = LoopPhase::Interpreting;
        session
            .history
            .push(Message::user(format_system_result(&request, &result)));
        session.state.advance();
        session.state.last_result = Some(result.clone());
        events.push(LoopEvent::Result { request, result });
    }

    /// Synthetic failure for an action that never ran. Still audited.
    fn refuse(&self, request: &ActionRequest, reason: &str) -> ExecutionResult {
        self.audit.append(AuditRecord::new(
            request.skill_id.as_str(),
            request.tag.as_str(),
            false,
            Some(reason.to_string()),
        ));
        ExecutionResult::blocked(reason)
    }

    fn finish(
        &self,
        session: &mut Session,
        reason: TerminationReason,
        message: &str,
        events: Vec<LoopEvent>,
    ) -> LoopReport {
        session.state.terminate(reason);
        metrics::increment_termination(reason);
        session.history.push(Message::assistant(message));
        LoopReport {
            events,
            outcome: LoopOutcome::Terminated {
                reason,
                message: message.to_string(),
            },
            step_count: session.state.step_count,
        }
    }
}

/// The pending request, if `request` resubmits it unchanged.
fn take_pending(
    state: &mut LoopState,
    request: &ActionRequest,
) -> Result<ActionRequest, RuntimeError> {
    match &state.pending {
        Some(pending)
            if state.phase == LoopPhase::AwaitingApproval
                && pending.skill_id == request.skill_id
                && pending.params == request.params =>
        {
            state.pending.take().ok_or_else(|| {
                RuntimeError::SessionError("No action is awaiting approval".to_string())
            })
        }
        Some(_) => Err(RuntimeError::SessionError(
            "Approval does not match the action awaiting approval".to_string(),
        )),
        None => Err(RuntimeError::SessionError(
            "No action is awaiting approval".to_string(),
        )),
    }
}
