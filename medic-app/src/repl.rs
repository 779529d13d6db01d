//! Interactive terminal front end. One session per process.

use crate::bootstrap::Components;
use anyhow::Result;
use medic_runtime::{LoopEvent, LoopOutcome, LoopReport, Orchestrator, RuntimeError, MAX_STEPS};
use medic_tools::dispatcher::RAW_COMMAND_ACTION;
use medic_tools::{
    ActionRequest, Approval, AuditRecord, AuditSink, AuditTrail, CommandDispatcher,
    ExecutionResult, SafetyClassifier, SkillRegistry, Verdict,
};
use std::io::{BufRead, Write};
use std::sync::Arc;

pub const SESSION_ID: &str = "repl";

pub struct Repl {
    registry: Arc<SkillRegistry>,
    classifier: Arc<SafetyClassifier>,
    dispatcher: Arc<CommandDispatcher>,
    audit: Arc<AuditTrail>,
    orchestrator: Arc<Orchestrator>,
    model: String,
}

impl Repl {
    pub fn new(components: Components) -> Self {
        Self {
            registry: components.registry,
            classifier: components.classifier,
            dispatcher: components.dispatcher,
            audit: components.audit,
            orchestrator: components.orchestrator,
            model: components.model,
        }
    }

    pub async fn run<R: BufRead, W: Write>(&self, input: &mut R, out: &mut W) -> Result<()> {
        writeln!(out, "╔══════════════════════════════════════════════════════════════════╗")?;
        writeln!(out, "║              Medic Troubleshooting Assistant                     ║")?;
        writeln!(out, "║  Commands: exit, status, help, /skills, /audit, /checklist       ║")?;
        writeln!(out, "╚══════════════════════════════════════════════════════════════════╝")?;
        writeln!(out)?;

        loop {
            write!(out, "medic> ")?;
            out.flush()?;

            let Some(line) = read_line(input)? else {
                break;
            };
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            match line {
                "exit" | "quit" => {
                    writeln!(out, "👋 Goodbye!")?;
                    break;
                }
                "help" => self.print_help(out)?,
                "status" => self.print_status(out).await?,
                "/skills" => writeln!(out, "\n{}", self.registry.render_manifest())?,
                "/audit" => self.print_audit(out)?,
                "/audit json" => write!(out, "{}", self.audit.to_json_lines()?)?,
                "/checklist" => self.print_checklist(out).await?,
                "clear" => write!(out, "\x1B[2J\x1B[1;1H")?,
                _ => match line.strip_prefix('!') {
                    Some(command) => self.run_shell(command.trim(), input, out).await?,
                    None => self.converse(line, input, out).await?,
                },
            }
        }

        Ok(())
    }

    async fn converse<R: BufRead, W: Write>(
        &self,
        text: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<()> {
        let mut next = self.orchestrator.handle_message(SESSION_ID, text).await;

        loop {
            let report = match next {
                Ok(report) => report,
                Err(e) => {
                    print_runtime_error(out, &e)?;
                    return Ok(());
                }
            };
            print_events(out, &report)?;

            match report.outcome {
                LoopOutcome::Concluded => return Ok(()),
                LoopOutcome::Terminated { message, .. } => {
                    writeln!(out, "\n{}\n", message)?;
                    return Ok(());
                }
                LoopOutcome::AwaitingApproval { request, reason } => {
                    writeln!(out, "\n🔐 {}", reason)?;
                    writeln!(out, "   {}", describe(&request))?;
                    next = if confirm(input, out)? {
                        self.orchestrator.approve(SESSION_ID, &request).await
                    } else {
                        self.orchestrator.decline(SESSION_ID).await
                    };
                }
            }
        }
    }

    /// `!command` runs free-form shell text after classification and an
    /// explicit confirmation.
    async fn run_shell<R: BufRead, W: Write>(
        &self,
        command: &str,
        input: &mut R,
        out: &mut W,
    ) -> Result<()> {
        if command.is_empty() {
            writeln!(out, "Usage: !<command>")?;
            return Ok(());
        }

        match self.classifier.classify_command(command) {
            Verdict::Blocked(reason) => {
                self.audit.append(AuditRecord::new(
                    RAW_COMMAND_ACTION,
                    command,
                    false,
                    Some(reason.clone()),
                ));
                writeln!(out, "⛔ {}\n", reason)?;
            }
            Verdict::RequiresApproval(reason) => {
                writeln!(out, "🔐 {}", reason)?;
                writeln!(out, "   $ {}", command)?;
                if !confirm(input, out)? {
                    writeln!(out, "Skipped.\n")?;
                    return Ok(());
                }
                match self.classifier.authorize_command(command, Approval::Granted) {
                    Ok(authorized) => {
                        let limits = self.dispatcher.limits();
                        let result = self
                            .dispatcher
                            .execute_raw(
                                &authorized,
                                limits.action_timeout_ms,
                                limits.output_cap_bytes,
                            )
                            .await;
                        print_result(out, RAW_COMMAND_ACTION, &result)?;
                    }
                    Err(verdict) => writeln!(out, "⛔ {}\n", verdict.reason())?,
                }
            }
            Verdict::Allowed => {
                writeln!(out, "⛔ Unexpected verdict for a raw command\n")?;
            }
        }
        Ok(())
    }

    fn print_help<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n📖 Available Commands:")?;
        writeln!(out, "  exit, quit  - Exit")?;
        writeln!(out, "  help        - Show this help message")?;
        writeln!(out, "  status      - Show loop status")?;
        writeln!(out, "  /skills     - List available skills")?;
        writeln!(out, "  /audit      - Show the audit trail")?;
        writeln!(out, "  /audit json - Export the audit trail as JSON lines")?;
        writeln!(out, "  /checklist  - Show the diagnostic checklist")?;
        writeln!(out, "  !<command>  - Run a shell command after approval")?;
        writeln!(out, "  clear       - Clear screen")?;
        writeln!(out, "\n💡 Describe your problem in plain language to start\n")?;
        Ok(())
    }

    async fn print_status<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n📊 Status:")?;
        writeln!(out, "  Model: {}", self.model)?;
        writeln!(out, "  Skills: {}", self.registry.count())?;
        writeln!(out, "  Audit records: {}", self.audit.len())?;
        match self.orchestrator.snapshot(SESSION_ID).await {
            Some(state) => {
                writeln!(out, "  Phase: {:?}", state.phase)?;
                writeln!(out, "  Steps: {}/{}", state.step_count, MAX_STEPS)?;
                if let Some(reason) = state.termination {
                    writeln!(out, "  Termination: {:?}", reason)?;
                }
                if let Some(pending) = &state.pending {
                    writeln!(out, "  Pending: {}", describe(pending))?;
                }
            }
            None => writeln!(out, "  Phase: Idle")?,
        }
        writeln!(out)?;
        Ok(())
    }

    fn print_audit<W: Write>(&self, out: &mut W) -> Result<()> {
        let records = self.audit.snapshot();
        if records.is_empty() {
            writeln!(out, "\n(no actions yet)\n")?;
            return Ok(());
        }
        writeln!(out)?;
        for record in records {
            let mark = if record.success { "✓" } else { "✗" };
            write!(
                out,
                "{} {} {} {}",
                record.timestamp.format("%H:%M:%S"),
                mark,
                record.action_type,
                record.command_text
            )?;
            match record.error_message {
                Some(error) => writeln!(out, " ({})", error)?,
                None => writeln!(out)?,
            }
        }
        writeln!(out)?;
        Ok(())
    }

    async fn print_checklist<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.orchestrator.snapshot(SESSION_ID).await {
            Some(state) if !state.checklist.is_empty() => {
                writeln!(out, "\n{}\n", state.checklist.render())?
            }
            _ => writeln!(out, "\n(no checklist)\n")?,
        }
        Ok(())
    }
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Ask for a yes/no answer. End of input counts as no.
fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<bool> {
    write!(out, "Approve? [y/N] ")?;
    out.flush()?;
    let answer = read_line(input)?.unwrap_or_default();
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn describe(request: &ActionRequest) -> String {
    if request.params.is_empty() {
        return request.skill_id.clone();
    }
    let params: Vec<String> = request
        .params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{} {}", request.skill_id, params.join(" "))
}

fn print_events<W: Write>(out: &mut W, report: &LoopReport) -> Result<()> {
    for event in &report.events {
        match event {
            LoopEvent::Reply(text) => {
                if !text.trim().is_empty() {
                    writeln!(out, "\n{}", text.trim())?;
                }
            }
            LoopEvent::Result { request, result } => {
                print_result(out, &request.skill_id, result)?;
            }
        }
    }
    Ok(())
}

fn print_result<W: Write>(out: &mut W, action: &str, result: &ExecutionResult) -> Result<()> {
    if result.success {
        writeln!(out, "\n✅ {} ({} ms)", action, result.duration_ms)?;
        if !result.output.is_empty() {
            writeln!(out, "{}", result.output)?;
        }
    } else {
        let error = result.error.as_deref().unwrap_or("action failed");
        writeln!(out, "\n❌ {}: {}", action, error)?;
    }
    Ok(())
}

fn print_runtime_error<W: Write>(out: &mut W, e: &RuntimeError) -> Result<()> {
    writeln!(out, "❌ Error: {}", e)?;
    if matches!(e, RuntimeError::BackendUnreachable(_)) {
        writeln!(out, "💡 Tip: check the backend endpoint, then send a new message")?;
    }
    writeln!(out)?;
    Ok(())
}
