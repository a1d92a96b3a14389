use serde::{Deserialize, Serialize};

/// Prefix of a tool-call line emitted by the model.
const CALL_PREFIX: &str = "[TOOL_CALL:";
/// Prefix of the result line echoed back into the conversation.
const RESULT_PREFIX: &str = "[TOOL_RESULT:";

/// A parsed `[TOOL_CALL:<id>] { ... }` line. The id is caller-chosen and
/// only meaningful for correlating the result line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallLine {
    pub id: String,
    pub body: serde_json::Value,
}

/// Parse a single line as a tool call. `None` when the line is ordinary
/// text; `Some(Err)` when it looks like a call but the JSON is broken.
pub fn parse_tool_call(line: &str) -> Option<Result<ToolCallLine, String>> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix(CALL_PREFIX)?;
    let Some(bracket) = rest.find(']') else {
        return Some(Err("missing ']' after tool-call id".to_string()));
    };
    let id = &rest[..bracket];
    if id.is_empty() || id.contains(char::is_whitespace) {
        return Some(Err(format!("malformed tool-call id {id:?}")));
    }
    let payload = rest[bracket + 1..].trim();
    match serde_json::from_str(payload) {
        Ok(body) => Some(Ok(ToolCallLine {
            id: id.to_string(),
            body,
        })),
        Err(e) => Some(Err(format!("tool call {id}: invalid JSON: {e}"))),
    }
}

/// Render the `[TOOL_RESULT:<id>] status=... ...` line.
#[must_use]
pub fn render_tool_result(id: &str, status: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => {
            format!("{RESULT_PREFIX}{id}] status={status} {detail}")
        },
        _ => format!("{RESULT_PREFIX}{id}] status={status}"),
    }
}
