//! `[SYSTEM_RESULT: ...]` blocks fed back to the reasoning backend.

use medic_tools::{ActionRequest, ExecutionResult};

pub const MAX_RESULT_OUTPUT_CHARS: usize = 2000;
pub const TRUNCATION_MARKER: &str = "... [truncated]";
const QUERY_TYPE_KEY: &str = "queryType";

/// Serialize one execution result for the next backend turn.
///
/// Embedded double quotes become single quotes because the tag grammar has
/// no escapes.
pub fn format_system_result(request: &ActionRequest, result: &ExecutionResult) -> String {
    let query_type = request
        .param(QUERY_TYPE_KEY)
        .unwrap_or(request.skill_id.as_str());
    let mut block = format!(
        "[SYSTEM_RESULT: queryType=\"{}\" output=\"{}\"",
        sanitize_value(query_type),
        sanitize_value(&truncate(&result.output))
    );
    if !result.success {
        let error = result.error.as_deref().unwrap_or("action failed");
        block.push_str(&format!(" error=\"{}\"", sanitize_value(error)));
    }
    block.push(']');
    block
}

fn truncate(output: &str) -> String {
    match output.char_indices().nth(MAX_RESULT_OUTPUT_CHARS) {
        Some((cut, _)) => format!("{}{}", &output[..cut], TRUNCATION_MARKER),
        None => output.to_string(),
    }
}

fn sanitize_value(value: &str) -> String {
    value.replace('"', "'")
}
