//! Skill descriptors: the static capabilities the reasoning backend may invoke.

use crate::error::ToolError;
use crate::platform::{CommandTemplates, Platform};
use crate::sanitize::sanitize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bound parameter values keyed by name.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    System,
    Network,
    Utility,
    Media,
}

/// Declared risk of a skill, independent of the arguments it is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskClass {
    Safe,
    ApprovalRequired,
    BlockedType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn accepts(&self, value: &str) -> bool {
        match self {
            ParamKind::String => true,
            ParamKind::Integer => value.trim().parse::<i64>().is_ok(),
            ParamKind::Boolean => matches!(value.trim(), "true" | "false"),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillParameter {
    pub name: String,
    #[serde(rename = "type", default = "default_param_kind")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_param_kind() -> ParamKind {
    ParamKind::String
}

impl SkillParameter {
    pub fn required(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::String,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::String,
            required: false,
            default: default.map(str::to_string),
        }
    }

    pub fn of_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }
}

/// How a skill turns bound parameters into a command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SkillKind {
    /// Parameters are shell-quoted into `{name}` placeholders.
    Template,
    /// The template comes from `queries`, keyed by the `selector` parameter.
    Query {
        selector: String,
        queries: BTreeMap<String, CommandTemplates>,
    },
    /// `param` names a process or application and is sanitized, not quoted.
    ProcessTarget { param: String },
    /// `param` carries free-form shell text chosen by the backend.
    Shell { param: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub category: SkillCategory,
    pub risk: RiskClass,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    #[serde(default)]
    pub templates: CommandTemplates,
    #[serde(flatten)]
    pub kind: SkillKind,
}

impl Skill {
    pub fn new(id: &str, category: SkillCategory, risk: RiskClass) -> Self {
        Self {
            id: id.to_string(),
            description: String::new(),
            category,
            risk,
            parameters: Vec::new(),
            templates: CommandTemplates::default(),
            kind: SkillKind::Template,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn param(mut self, parameter: SkillParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn templates(mut self, templates: CommandTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn kind(mut self, kind: SkillKind) -> Self {
        self.kind = kind;
        self
    }

    /// Name of the parameter carrying free-form shell text, if any.
    pub fn shell_param(&self) -> Option<&str> {
        match &self.kind {
            SkillKind::Shell { param } => Some(param),
            _ => None,
        }
    }

    /// Apply defaults and check the parameter contract. Keys the skill does
    /// not declare are passed through untouched.
    pub fn bind(&self, params: &Params) -> Result<Params, ToolError> {
        let mut bound = params.clone();
        for parameter in &self.parameters {
            match params.get(&parameter.name) {
                Some(value) => {
                    if !parameter.kind.accepts(value) {
                        return Err(ToolError::InvalidParameter {
                            name: parameter.name.clone(),
                            expected: parameter.kind.as_str(),
                            value: value.clone(),
                        });
                    }
                }
                None => match &parameter.default {
                    Some(default) => {
                        bound.insert(parameter.name.clone(), default.clone());
                    }
                    None if parameter.required => {
                        return Err(ToolError::MissingParameter(parameter.name.clone()));
                    }
                    None => {}
                },
            }
        }
        Ok(bound)
    }

    /// Template for `platform`, taking query selection into account.
    pub fn template_for(&self, params: &Params, platform: Platform) -> Result<&str, ToolError> {
        let templates = match &self.kind {
            SkillKind::Query { selector, queries } => {
                let key = params
                    .get(selector)
                    .ok_or_else(|| ToolError::MissingParameter(selector.clone()))?;
                queries.get(key).ok_or_else(|| ToolError::InvalidParameter {
                    name: selector.clone(),
                    expected: "a known query",
                    value: key.clone(),
                })?
            }
            _ => &self.templates,
        };
        templates
            .get(platform)
            .ok_or_else(|| ToolError::PlatformUnsupported {
                skill: self.id.clone(),
                platform,
            })
    }

    /// Substitute bound parameters into `template`.
    ///
    /// Ordinary values are quoted for the platform shell, process targets are
    /// sanitized, shell text goes in verbatim. Placeholders that name no bound
    /// parameter are left as they are.
    pub fn render(&self, template: &str, params: &Params, platform: Platform) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name_len = after
                .find('}')
                .filter(|&end| end > 0 && after[..end].chars().all(is_ident_char));
            match name_len.and_then(|end| params.get(&after[..end]).map(|v| (end, v))) {
                Some((end, value)) => {
                    out.push_str(&self.render_value(&after[..end], value, platform));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn render_value(&self, name: &str, value: &str, platform: Platform) -> String {
        match &self.kind {
            SkillKind::ProcessTarget { param } if param == name => sanitize_name(value),
            SkillKind::Shell { param } if param == name => value.to_string(),
            _ => platform.quote(value),
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
