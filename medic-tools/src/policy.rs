//! Two-layer safety classification.
//!
//! Layer one looks only at the declared action type: a fixed blocklist of type
//! names, then the risk class of the skill descriptor. Layer two runs a fixed
//! list of case-insensitive patterns over free-form shell text and blocks any
//! match, whatever layer one said. The layers are kept separate on purpose
//! and neither is derived from the other.
//!
//! Dispatching needs an [`AuthorizedAction`] or [`AuthorizedCommand`], and
//! only this module can construct them.

use crate::registry::SkillRegistry;
use crate::request::ActionRequest;
use crate::skill::{Params, RiskClass, Skill};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Declared action types that are refused no matter how they are invoked.
pub const BLOCKED_TYPES: &[&str] = &[
    "delete-system-file",
    "modify-registry",
    "format-drive",
    "disable-security",
];

pub const BLOCKED_FOR_SECURITY: &str = "blocked for security reasons";

/// Ordered raw-command patterns. The label is only used in logs.
static RAW_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // destructive filesystem operations
        (
            r"\brm\s+(-\S*\s+)*(-[a-z]*r[a-z]*|--recursive)\s+(-\S*\s+)*(/|~|\*|\$home)",
            "recursive delete",
        ),
        (r"\b(del|erase|rd|rmdir)\s+(\S+\s+)*/s\b", "recursive delete"),
        (r"\bremove-item\b.*-recurse", "recursive delete"),
        // disk formatting and partitioning
        (r"\bformat\s+[a-z]:", "disk format"),
        (r"\bmkfs(\.[a-z0-9]+)?\b", "disk format"),
        (r"\bdiskutil\s+(erase\w*|partitiondisk|zerodisk|secureerase)\b", "disk format"),
        (r"\b(diskpart|wipefs|fdisk|sfdisk|parted)\b", "disk partitioning"),
        // low-level device writes
        (r"\bdd\b.*\bof=/dev/", "device write"),
        (r">\s*/dev/(sd|hd|vd|nvme|disk|mmcblk)", "device write"),
        (r"\bshred\b.*/dev/", "device write"),
        // privilege escalation
        (r"\b(sudo|doas|pkexec|runas)\b", "privilege escalation"),
        (r"\bsu\b", "privilege escalation"),
        (r"\bchmod\s+(-[a-z]+\s+)*[0-7]?777\s+/", "privilege escalation"),
        (r"\bchmod\s+[ugoa]*\+s\b", "privilege escalation"),
        // mass process kill
        (r"\bkillall\b", "mass kill"),
        (r"\bkill\s+(-[a-z0-9]+\s+)*-1\b", "mass kill"),
        (r":\(\)\s*\{.*\}\s*;\s*:", "fork bomb"),
        // shutdown and reboot
        (r"\b(shutdown|reboot|halt|poweroff)\b", "shutdown"),
        (r"\binit\s+[06]\b", "shutdown"),
        (r"\bsystemctl\s+(poweroff|reboot|halt|kexec)\b", "shutdown"),
        (r"\b(stop|restart)-computer\b", "shutdown"),
        // remote code piped into a shell
        (r"\b(curl|wget)\b.*\|\s*(sudo\s+)?(ba|z|k|da)?sh\b", "pipe to shell"),
        // security controls and the windows registry
        (r"\breg\s+(delete|add)\b", "registry edit"),
        (r"\b(csrutil\s+disable|setenforce\s+0|spctl\s+--master-disable)\b", "security disable"),
    ]
    .into_iter()
    .map(|(pattern, label)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("static pattern compiles");
        (regex, label)
    })
    .collect()
});

/// Label of the first raw pattern `command` matches.
pub fn match_raw_pattern(command: &str) -> Option<&'static str> {
    RAW_PATTERNS
        .iter()
        .find(|(regex, _)| regex.is_match(command))
        .map(|(_, label)| *label)
}

pub fn is_blocked_type(skill_id: &str) -> bool {
    BLOCKED_TYPES.contains(&skill_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    RequiresApproval(String),
    Blocked(String),
}

impl Verdict {
    pub fn reason(&self) -> &str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::RequiresApproval(reason) | Verdict::Blocked(reason) => reason,
        }
    }
}

/// Whether the human approver has confirmed this exact request. Approval is
/// never remembered between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    NotGranted,
    Granted,
}

/// A skill invocation that passed classification.
#[derive(Debug)]
pub struct AuthorizedAction {
    skill: Arc<Skill>,
    params: Params,
}

impl AuthorizedAction {
    pub fn skill(&self) -> &Skill {
        &self.skill
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

/// A raw shell command that passed classification.
#[derive(Debug)]
pub struct AuthorizedCommand {
    command: String,
}

impl AuthorizedCommand {
    pub fn command(&self) -> &str {
        &self.command
    }
}

pub struct SafetyClassifier {
    registry: Arc<SkillRegistry>,
}

impl SafetyClassifier {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }

    pub fn classify(&self, request: &ActionRequest) -> Verdict {
        self.evaluate(request).0
    }

    /// Classify free-form shell text. Anything not blocked still needs
    /// approval.
    pub fn classify_command(&self, command: &str) -> Verdict {
        if let Some(label) = match_raw_pattern(command) {
            warn!("Raw command blocked ({}): {}", label, command);
            return Verdict::Blocked(BLOCKED_FOR_SECURITY.to_string());
        }
        Verdict::RequiresApproval("Custom shell commands need your approval".to_string())
    }

    pub fn authorize(
        &self,
        request: &ActionRequest,
        approval: Approval,
    ) -> Result<AuthorizedAction, Verdict> {
        let (verdict, skill) = self.evaluate(request);
        match (verdict, skill) {
            (Verdict::Allowed, Some(skill)) => Ok(AuthorizedAction {
                skill,
                params: request.params.clone(),
            }),
            (Verdict::RequiresApproval(_), Some(skill)) if approval == Approval::Granted => {
                debug!("Approved action: {}", request.skill_id);
                Ok(AuthorizedAction {
                    skill,
                    params: request.params.clone(),
                })
            }
            (verdict, _) => Err(verdict),
        }
    }

    pub fn authorize_command(
        &self,
        command: &str,
        approval: Approval,
    ) -> Result<AuthorizedCommand, Verdict> {
        match self.classify_command(command) {
            Verdict::RequiresApproval(_) if approval == Approval::Granted => Ok(AuthorizedCommand {
                command: command.to_string(),
            }),
            verdict => Err(verdict),
        }
    }

    fn evaluate(&self, request: &ActionRequest) -> (Verdict, Option<Arc<Skill>>) {
        let skill_id = request.skill_id.as_str();
        if is_blocked_type(skill_id) {
            warn!("Blocked declared action type: {}", skill_id);
            return (
                Verdict::Blocked(format!("Action type '{skill_id}' is never allowed")),
                None,
            );
        }

        let Some(skill) = self.registry.lookup(skill_id) else {
            warn!("Unknown action type: {}", skill_id);
            return (
                Verdict::Blocked(format!("Unknown action type '{skill_id}'")),
                None,
            );
        };

        let declared = match skill.risk {
            RiskClass::Safe => Verdict::Allowed,
            RiskClass::ApprovalRequired => Verdict::RequiresApproval(format!(
                "'{skill_id}' changes your system and needs your approval"
            )),
            RiskClass::BlockedType => {
                warn!("Blocked skill by descriptor: {}", skill_id);
                Verdict::Blocked(format!("Action type '{skill_id}' is never allowed"))
            }
        };

        if let Some(param) = skill.shell_param() {
            let command = request.param(param).unwrap_or_default();
            if let Some(label) = match_raw_pattern(command) {
                warn!("Shell text blocked ({}) in {}: {}", label, skill_id, command);
                return (
                    Verdict::Blocked(BLOCKED_FOR_SECURITY.to_string()),
                    Some(skill),
                );
            }
        }

        (declared, Some(skill))
    }
}
