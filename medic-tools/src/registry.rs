use crate::error::ToolError;
use crate::platform::Platform;
use crate::skill::{Params, Skill, SkillKind};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// Immutable skill catalog. Built once at startup through
/// [`SkillRegistryBuilder`]; nothing can be added or removed afterwards.
#[derive(Debug)]
pub struct SkillRegistry {
    skills: Vec<Arc<Skill>>,
    index: HashMap<String, usize>,
}

impl SkillRegistry {
    pub fn builder() -> SkillRegistryBuilder {
        SkillRegistryBuilder::default()
    }

    pub fn lookup(&self, skill_id: &str) -> Option<Arc<Skill>> {
        self.index.get(skill_id).map(|&i| self.skills[i].clone())
    }

    /// Command template for `skill` on `platform`. Query skills pick theirs
    /// by the selector value in `params`.
    pub fn resolve_command<'a>(
        &self,
        skill: &'a Skill,
        params: &Params,
        platform: Platform,
    ) -> Result<&'a str, ToolError> {
        skill.template_for(params, platform)
    }

    /// All skills in registration order.
    pub fn list_all(&self) -> &[Arc<Skill>] {
        &self.skills
    }

    pub fn count(&self) -> usize {
        self.skills.len()
    }

    /// Capability manifest handed to the reasoning backend.
    pub fn render_manifest(&self) -> String {
        let mut out = String::from("Available actions:\n");
        for skill in &self.skills {
            let _ = write!(out, "- type=\"{}\"", skill.id);
            for param in &skill.parameters {
                match (&param.default, param.required) {
                    (Some(default), _) => {
                        let _ = write!(
                            out,
                            " {}=\"...\" (optional, default {:?})",
                            param.name, default
                        );
                    }
                    (None, true) => {
                        let _ = write!(out, " {}=\"...\" (required)", param.name);
                    }
                    (None, false) => {
                        let _ = write!(out, " {}=\"...\" (optional)", param.name);
                    }
                }
            }
            if let SkillKind::Query { selector, queries } = &skill.kind {
                let names: Vec<&str> = queries.keys().map(String::as_str).collect();
                let _ = write!(out, " [{}: {}]", selector, names.join(", "));
            }
            if !skill.description.is_empty() {
                let _ = write!(out, ": {}", skill.description);
            }
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct SkillRegistryBuilder {
    skills: Vec<Skill>,
}

impl SkillRegistryBuilder {
    pub fn register(&mut self, skill: Skill) -> &mut Self {
        self.skills.push(skill);
        self
    }

    pub fn build(&mut self) -> Result<SkillRegistry, ToolError> {
        let mut skills = Vec::with_capacity(self.skills.len());
        let mut index = HashMap::with_capacity(self.skills.len());
        for skill in self.skills.drain(..) {
            if index.contains_key(&skill.id) {
                return Err(ToolError::DuplicateSkill(skill.id));
            }
            index.insert(skill.id.clone(), skills.len());
            skills.push(Arc::new(skill));
        }
        Ok(SkillRegistry { skills, index })
    }
}

impl FromIterator<Skill> for SkillRegistryBuilder {
    fn from_iter<I: IntoIterator<Item = Skill>>(iter: I) -> Self {
        Self {
            skills: iter.into_iter().collect(),
        }
    }
}
