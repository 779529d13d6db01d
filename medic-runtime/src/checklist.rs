//! Diagnostic checklist tracked from markdown checkboxes in backend replies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    items: Vec<ChecklistItem>,
}

impl Checklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.items.iter().filter(|item| !item.done).count()
    }

    /// Fold every checkbox line of `text` into the list. Known items take
    /// the new state; new items are appended in order of appearance.
    pub fn merge(&mut self, text: &str) -> usize {
        let mut touched = 0;
        for (item_text, done) in text.lines().filter_map(parse_checkbox) {
            touched += 1;
            match self
                .items
                .iter_mut()
                .find(|item| item.text.eq_ignore_ascii_case(item_text))
            {
                Some(item) => item.done = done,
                None => self.items.push(ChecklistItem {
                    text: item_text.to_string(),
                    done,
                }),
            }
        }
        touched
    }

    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("- [{}] {}", if item.done { "x" } else { " " }, item.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `- [ ] text`, `* [x] text` or `- [X] text`.
fn parse_checkbox(line: &str) -> Option<(&str, bool)> {
    let rest = line.trim_start();
    let rest = rest.strip_prefix('-').or_else(|| rest.strip_prefix('*'))?;
    let rest = rest.strip_prefix(' ')?.trim_start();
    let (done, rest) = if let Some(rest) = rest.strip_prefix("[ ]") {
        (false, rest)
    } else if let Some(rest) = rest.strip_prefix("[x]").or_else(|| rest.strip_prefix("[X]")) {
        (true, rest)
    } else {
        return None;
    };
    let text = rest.trim();
    if text.is_empty() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((text, done))
}
