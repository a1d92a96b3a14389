//! Wire shapes shared with the transports: chat-stream events with their
//! SSE framing, the agent tool-call line protocol, and the boundary status
//! code mapping.
//!
//! The transports themselves (REST/WS/SSE plumbing) live outside this
//! workspace; everything here is pure data.

pub mod events;
pub mod sse;
pub mod status;
pub mod tool_call;

pub use {
    events::{ApprovalOutcome, ChatEvent, JobRef, PendingJobRef, ToolResultRef},
    sse::frame_event,
    status::BoundaryStatus,
    tool_call::{ToolCallLine, parse_tool_call, render_tool_result},
};
