use crate::events::ChatEvent;

/// Server-sent-events framing: `event: <TypeName>\ndata: <json>\n\n`.
pub fn frame_event(event: &ChatEvent) -> serde_json::Result<String> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {data}\n\n", event.type_name()))
}
