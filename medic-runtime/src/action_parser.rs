//! Extraction of `[ACTION: key="value" ...]` tags from backend text.
//!
//! Values are double-quoted with no escape support, so the first `"` after
//! the opening quote always closes the value. A tag that does not follow the
//! grammar is left in the display text and produces no action.

use medic_tools::{ActionRequest, Params};
use tracing::debug;

pub const ACTION_OPEN: &str = "[ACTION:";
const TYPE_KEY: &str = "type";

/// Backend text split into what the user sees and what the runtime does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResponse {
    pub display_text: String,
    pub actions: Vec<ActionRequest>,
}

impl ParsedResponse {
    pub fn first_action(&self) -> Option<&ActionRequest> {
        self.actions.first()
    }
}

/// Why a candidate tag was rejected. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Malformed {
    ExpectedKey,
    ExpectedEquals,
    ExpectedQuote,
    Unterminated,
    TrailingGarbage,
}

struct Tag {
    end: usize,
    pairs: Params,
}

/// Parse every action tag in `text`. Never fails.
pub fn parse(text: &str) -> ParsedResponse {
    let mut display_text = String::with_capacity(text.len());
    let mut actions = Vec::new();
    let mut copied = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(ACTION_OPEN) {
        let start = cursor + offset;
        match parse_tag(text, start) {
            Ok(tag) => {
                display_text.push_str(&text[copied..start]);
                copied = tag.end;
                cursor = tag.end;
                let literal = &text[start..tag.end];
                match into_request(tag.pairs, literal, text) {
                    Some(request) => actions.push(request),
                    None => debug!("Dropping action tag without type: {}", literal),
                }
            }
            Err(reason) => {
                debug!("Ignoring malformed action tag at byte {}: {:?}", start, reason);
                cursor = start + ACTION_OPEN.len();
            }
        }
    }
    display_text.push_str(&text[copied..]);

    ParsedResponse {
        display_text,
        actions,
    }
}

fn into_request(mut pairs: Params, literal: &str, text: &str) -> Option<ActionRequest> {
    let skill_id = pairs.remove(TYPE_KEY)?;
    let mut request = ActionRequest::new(skill_id, pairs);
    request.tag = literal.to_string();
    request.raw_text = text.to_string();
    Some(request)
}

fn parse_tag(text: &str, start: usize) -> Result<Tag, Malformed> {
    let bytes = text.as_bytes();
    let mut pos = start + ACTION_OPEN.len();
    let mut pairs = Params::new();

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos) {
            None => return Err(Malformed::Unterminated),
            Some(b']') => {
                return Ok(Tag {
                    end: pos + 1,
                    pairs,
                })
            }
            Some(_) => {}
        }

        let key_start = pos;
        if !bytes[pos].is_ascii_alphabetic() && bytes[pos] != b'_' {
            return Err(Malformed::ExpectedKey);
        }
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
            pos += 1;
        }
        let key = &text[key_start..pos];

        if bytes.get(pos) != Some(&b'=') {
            return Err(Malformed::ExpectedEquals);
        }
        pos += 1;
        if bytes.get(pos) != Some(&b'"') {
            return Err(Malformed::ExpectedQuote);
        }
        pos += 1;

        let value_start = pos;
        let value_len = text[value_start..]
            .find('"')
            .ok_or(Malformed::Unterminated)?;
        pos = value_start + value_len + 1;
        // Last occurrence of a key wins.
        pairs.insert(key.to_string(), text[value_start..pos - 1].to_string());

        match bytes.get(pos) {
            None => return Err(Malformed::Unterminated),
            Some(b) if b.is_ascii_whitespace() || *b == b']' => {}
            Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
            Some(_) => return Err(Malformed::TrailingGarbage),
        }
    }
}
