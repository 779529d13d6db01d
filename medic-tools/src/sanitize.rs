//! Sanitization of process and application names before template
//! substitution.
//!
//! Names are never rejected: every character outside the safe set is
//! stripped and whatever remains is substituted. `"Chrome;rm -rf ~"` becomes
//! `"Chromerm-rf"`. Whitespace is stripped as well, so the result is always a
//! single shell word.

use tracing::warn;

fn is_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

/// Strip every character outside `[A-Za-z0-9_.-]`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|&ch| is_safe(ch)).collect();
    if cleaned != name {
        warn!("Sanitized process name {:?} to {:?}", name, cleaned);
    }
    cleaned
}
