use medic_tools::{Platform, SkillRegistry};

pub const DEFAULT_INSTRUCTIONS: &str = "You are Medic, a careful assistant that diagnoses and fixes problems on the user's computer. \
Investigate before acting, prefer read-only queries, and explain what you found in plain language.";

const GRAMMAR: &str = r#"To run an action, write a tag on its own line:
[ACTION: type="<action type>" name="value" ...]
Values are always double-quoted and cannot contain double quotes.
Only the first action in a reply is run. Its result comes back as:
[SYSTEM_RESULT: queryType="..." output="..." error="..."]
Track your plan as a markdown checklist ("- [ ] step", "- [x] done step").
When you have found the cause, reply without any action tag."#;

/// System prompt: operating instructions, the tag grammar and the
/// capability manifest, in that order.
pub fn build_system_prompt(
    instructions: &str,
    registry: &SkillRegistry,
    platform: Platform,
) -> String {
    format!(
        "{}\n\nThe user's operating system is {}.\n\n{}\n\n{}",
        instructions.trim(),
        platform,
        GRAMMAR,
        registry.render_manifest().trim_end()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use medic_tools::builtin_registry;

    #[test]
    fn test_prompt_embeds_manifest_verbatim() {
        let registry = builtin_registry().unwrap();
        let prompt = build_system_prompt(DEFAULT_INSTRUCTIONS, &registry, Platform::Linux);
        assert!(prompt.starts_with("You are Medic"));
        assert!(prompt.contains("operating system is linux"));
        assert!(prompt.contains(registry.render_manifest().trim_end()));
        assert!(prompt.contains("[ACTION: type="));
    }
}
