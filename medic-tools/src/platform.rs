//! Host platform identification and per-platform command templates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family a command template targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    /// Platform of the running process. Unix flavours other than macOS use
    /// the Linux templates.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        }
    }

    /// Shell program and flag used to run a command line.
    pub fn shell(&self) -> (&'static str, &'static str) {
        match self {
            Platform::Windows => ("cmd", "/C"),
            Platform::Linux | Platform::Macos => ("sh", "-c"),
        }
    }

    /// Quote a parameter value so the platform shell treats it as one word.
    pub fn quote(&self, value: &str) -> String {
        match self {
            Platform::Windows => format!("\"{}\"", value.replace('"', "")),
            Platform::Linux | Platform::Macos => {
                format!("'{}'", value.replace('\'', r"'\''"))
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One optional command template per platform. A missing entry means the
/// skill is unsupported there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<String>,
}

impl CommandTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same template on every platform.
    pub fn everywhere(template: impl Into<String>) -> Self {
        let template = template.into();
        Self {
            linux: Some(template.clone()),
            macos: Some(template.clone()),
            windows: Some(template),
        }
    }

    pub fn linux(mut self, template: impl Into<String>) -> Self {
        self.linux = Some(template.into());
        self
    }

    pub fn macos(mut self, template: impl Into<String>) -> Self {
        self.macos = Some(template.into());
        self
    }

    pub fn windows(mut self, template: impl Into<String>) -> Self {
        self.windows = Some(template.into());
        self
    }

    /// Both unix flavours share one template.
    pub fn unix(self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.linux(template.clone()).macos(template)
    }

    pub fn get(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Linux => self.linux.as_deref(),
            Platform::Macos => self.macos.as_deref(),
            Platform::Windows => self.windows.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_lookup_is_per_platform() {
        let templates = CommandTemplates::new()
            .linux("free -h")
            .macos("vm_stat");
        assert_eq!(templates.get(Platform::Linux), Some("free -h"));
        assert_eq!(templates.get(Platform::Macos), Some("vm_stat"));
        assert_eq!(templates.get(Platform::Windows), None);
    }

    #[test]
    fn test_unix_quote_escapes_single_quotes() {
        assert_eq!(Platform::Linux.quote("it's"), r"'it'\''s'");
        assert_eq!(Platform::Macos.quote("a b"), "'a b'");
    }

    #[test]
    fn test_windows_quote_drops_double_quotes() {
        assert_eq!(Platform::Windows.quote(r#"C:\a "b""#), r#""C:\a b""#);
    }

    #[test]
    fn test_platform_serialization() {
        let json = serde_json::to_string(&Platform::Macos).unwrap();
        assert_eq!(json, r#""macos""#);
    }
}
