use crate::skill::Params;
use serde::{Deserialize, Serialize};

/// A concrete invocation extracted from backend text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub skill_id: String,
    /// Every key of the tag except `type`.
    pub params: Params,
    /// The exact tag substring the request was parsed from.
    pub tag: String,
    /// The full text block the tag appeared in.
    pub raw_text: String,
}

impl ActionRequest {
    pub fn new(skill_id: impl Into<String>, params: Params) -> Self {
        Self {
            skill_id: skill_id.into(),
            params,
            tag: String::new(),
            raw_text: String::new(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
