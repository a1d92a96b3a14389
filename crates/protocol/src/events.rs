use serde::{Deserialize, Serialize};

/// Job summary carried by `ToolCallStart` / `ToolCallResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub id: String,
    pub action_type: String,
    pub status: String,
}

/// Job summary carried by `ApprovalRequired`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJobRef {
    pub id: String,
    pub action_type: String,
}

/// Interleaved events on a chat stream, in worker production order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatEvent {
    TextDelta {
        delta: String,
    },
    ToolCallStart {
        job: JobRef,
    },
    ToolCallResult {
        result: ToolResultRef,
    },
    /// The stream suspends after this event until the companion approval
    /// endpoint resolves the pending promise for the job.
    ApprovalRequired {
        pending_job: PendingJobRef,
    },
    ApprovalResult {
        approval_outcome: ApprovalOutcome,
    },
    Error {
        error: String,
    },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultRef {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub status: String,
}

impl ChatEvent {
    /// The SSE event name for this variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "TextDelta",
            Self::ToolCallStart { .. } => "ToolCallStart",
            Self::ToolCallResult { .. } => "ToolCallResult",
            Self::ApprovalRequired { .. } => "ApprovalRequired",
            Self::ApprovalResult { .. } => "ApprovalResult",
            Self::Error { .. } => "Error",
            Self::Done => "Done",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ChatEvent::ToolCallStart {
            job: JobRef {
                id: "j-1".into(),
                action_type: "executeSafeShell".into(),
                status: "Executing".into(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"toolCallStart""#));
        assert!(json.contains(r#""actionType":"executeSafeShell""#));
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_done_has_no_payload() {
        assert_eq!(
            serde_json::to_string(&ChatEvent::Done).unwrap(),
            r#"{"type":"done"}"#
        );
        assert_eq!(ChatEvent::Done.type_name(), "Done");
    }
}
