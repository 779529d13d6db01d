//! Built-in skill catalog.

use crate::error::ToolError;
use crate::platform::CommandTemplates;
use crate::registry::{SkillRegistry, SkillRegistryBuilder};
use crate::skill::{ParamKind, RiskClass, Skill, SkillCategory, SkillKind, SkillParameter};
use std::collections::BTreeMap;

fn system_queries() -> BTreeMap<String, CommandTemplates> {
    let entries = [
        (
            "top-processes",
            CommandTemplates::new()
                .linux("ps aux --sort=-%mem | head -10")
                .macos("ps aux -m | head -10")
                .windows("powershell -NoProfile -Command \"Get-Process | Sort-Object WS -Descending | Select-Object -First 10\""),
        ),
        (
            "cpu-usage",
            CommandTemplates::new()
                .linux("top -bn1 | head -15")
                .macos("top -l 1 -n 10 -o cpu")
                .windows("wmic cpu get loadpercentage"),
        ),
        (
            "memory-usage",
            CommandTemplates::new()
                .linux("free -h")
                .macos("vm_stat")
                .windows("systeminfo | findstr /C:\"Memory\""),
        ),
        (
            "disk-usage",
            CommandTemplates::new()
                .unix("df -h")
                .windows("wmic logicaldisk get caption,freespace,size"),
        ),
        (
            "uptime",
            CommandTemplates::new()
                .unix("uptime")
                .windows("net statistics workstation | findstr /C:\"since\""),
        ),
        (
            "network-interfaces",
            CommandTemplates::new()
                .linux("ip -brief address")
                .macos("ifconfig")
                .windows("ipconfig"),
        ),
        (
            "listening-ports",
            CommandTemplates::new()
                .linux("ss -tulpn | head -30")
                .macos("lsof -iTCP -sTCP:LISTEN -n -P | head -30")
                .windows("netstat -ano | findstr LISTENING"),
        ),
        (
            "dns-config",
            CommandTemplates::new()
                .linux("resolvectl status | head -30")
                .macos("scutil --dns | head -30")
                .windows("ipconfig /all | findstr /C:\"DNS\""),
        ),
    ];
    entries
        .into_iter()
        .map(|(name, templates)| (name.to_string(), templates))
        .collect()
}

/// Skills shipped with the binary, in manifest order.
pub fn builtin_skills() -> Vec<Skill> {
    vec![
        Skill::new("query-system", SkillCategory::System, RiskClass::Safe)
            .describe("Read-only system inspection")
            .param(SkillParameter::required("queryType"))
            .kind(SkillKind::Query {
                selector: "queryType".to_string(),
                queries: system_queries(),
            }),
        Skill::new("ping-host", SkillCategory::Network, RiskClass::Safe)
            .describe("Check that a host is reachable")
            .param(SkillParameter::optional("host", Some("8.8.8.8")))
            .param(SkillParameter::optional("count", Some("4")).of_kind(ParamKind::Integer))
            .templates(
                CommandTemplates::new()
                    .unix("ping -c {count} {host}")
                    .windows("ping -n {count} {host}"),
            ),
        Skill::new("kill-process", SkillCategory::System, RiskClass::ApprovalRequired)
            .describe("Terminate a process by name")
            .param(SkillParameter::required("processName"))
            .templates(
                CommandTemplates::new()
                    .unix("pkill -f {processName}")
                    .windows("taskkill /IM {processName}.exe /F"),
            )
            .kind(SkillKind::ProcessTarget {
                param: "processName".to_string(),
            }),
        Skill::new("restart-app", SkillCategory::System, RiskClass::ApprovalRequired)
            .describe("Quit an application and start it again")
            .param(SkillParameter::required("appName"))
            .templates(
                CommandTemplates::new()
                    .linux("pkill -x {appName}; sleep 2; nohup {appName} >/dev/null 2>&1 &")
                    .macos("osascript -e 'quit app \"{appName}\"' && sleep 2 && open -a {appName}")
                    .windows("taskkill /IM {appName}.exe /F & timeout /T 2 >NUL & start \"\" {appName}"),
            )
            .kind(SkillKind::ProcessTarget {
                param: "appName".to_string(),
            }),
        Skill::new("clear-cache", SkillCategory::Utility, RiskClass::ApprovalRequired)
            .describe("Remove user cache files older than a week")
            .templates(
                CommandTemplates::new()
                    .linux("find ~/.cache -mindepth 1 -maxdepth 1 -mtime +7 -exec rm -rf {} +")
                    .macos("find ~/Library/Caches -mindepth 1 -maxdepth 1 -mtime +7 -exec rm -rf {} +")
                    .windows("del /q /f /s %TEMP%\\* >NUL 2>&1"),
            ),
        Skill::new("empty-trash", SkillCategory::Utility, RiskClass::ApprovalRequired)
            .describe("Empty the user's trash")
            .templates(
                CommandTemplates::new()
                    .linux("gio trash --empty")
                    .macos("osascript -e 'tell application \"Finder\" to empty trash'")
                    .windows("powershell -NoProfile -Command \"Clear-RecycleBin -Force\""),
            ),
        Skill::new("flush-dns", SkillCategory::Network, RiskClass::ApprovalRequired)
            .describe("Flush the DNS resolver cache")
            .templates(
                CommandTemplates::new()
                    .linux("resolvectl flush-caches")
                    .macos("dscacheutil -flushcache && killall -HUP mDNSResponder")
                    .windows("ipconfig /flushdns"),
            ),
        Skill::new("convert-media", SkillCategory::Media, RiskClass::ApprovalRequired)
            .describe("Convert an audio or video file with ffmpeg")
            .param(SkillParameter::required("input"))
            .param(SkillParameter::required("output"))
            .templates(CommandTemplates::everywhere("ffmpeg -y -i {input} {output}")),
        Skill::new("convert-image", SkillCategory::Media, RiskClass::ApprovalRequired)
            .describe("Convert an image to another format")
            .param(SkillParameter::required("input"))
            .param(SkillParameter::required("output"))
            .param(SkillParameter::optional("format", Some("png")))
            .templates(
                CommandTemplates::new()
                    .linux("convert {input} {output}")
                    .macos("sips -s format {format} {input} --out {output}"),
            ),
        Skill::new("run-command", SkillCategory::Utility, RiskClass::ApprovalRequired)
            .describe("Run a custom shell command")
            .param(SkillParameter::required("command"))
            .templates(CommandTemplates::everywhere("{command}"))
            .kind(SkillKind::Shell {
                param: "command".to_string(),
            }),
    ]
}

/// Registry holding [`builtin_skills`].
pub fn builtin_registry() -> Result<SkillRegistry, ToolError> {
    builtin_skills()
        .into_iter()
        .collect::<SkillRegistryBuilder>()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::skill::Params;

    #[test]
    fn test_builtin_ids_are_unique() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.count(), builtin_skills().len());
    }

    #[test]
    fn test_every_query_has_a_linux_template() {
        for (name, templates) in system_queries() {
            assert!(templates.get(Platform::Linux).is_some(), "{name}");
        }
    }

    #[test]
    fn test_destructive_skills_require_approval() {
        let registry = builtin_registry().unwrap();
        for id in [
            "kill-process",
            "restart-app",
            "clear-cache",
            "empty-trash",
            "flush-dns",
            "run-command",
        ] {
            let skill = registry.lookup(id).unwrap();
            assert_eq!(skill.risk, RiskClass::ApprovalRequired, "{id}");
        }
    }

    #[test]
    fn test_convert_image_unsupported_on_windows() {
        let registry = builtin_registry().unwrap();
        let skill = registry.lookup("convert-image").unwrap();
        assert!(skill.template_for(&Params::new(), Platform::Windows).is_err());
    }

    #[test]
    fn test_catalog_survives_yaml_round_trip() {
        let yaml = serde_yaml::to_string(&builtin_skills()).unwrap();
        let parsed: Vec<Skill> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, builtin_skills());
    }
}
