use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use {
    sharpclaw_common::CallerIdentity,
    sharpclaw_permissions::{ActionType, Clearance},
    sharpclaw_shell::Script,
};

use crate::error::{Error, Result};

/// Job status machine. Initial state is `Queued`.
///
/// ```text
/// Queued ──► PermissionCheck ──► (Denied | AwaitingApproval | Executing)
/// AwaitingApproval ──approve──► Executing
/// AwaitingApproval ──deny/cancel──► Cancelled
/// Executing ──► Completed | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    PermissionCheck,
    Denied,
    AwaitingApproval,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Denied | Self::Cancelled | Self::Completed | Self::Failed
        )
    }

    #[must_use]
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        // Cancel is legal from any non-terminal state.
        if to == Self::Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Self::Queued, Self::PermissionCheck)
                | (
                    Self::PermissionCheck,
                    Self::Denied | Self::AwaitingApproval | Self::Executing
                )
                | (Self::AwaitingApproval, Self::Executing)
                | (Self::Executing, Self::Completed | Self::Failed)
        )
    }
}

/// What the worker runs once the job clears permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobPayload {
    /// Compile and execute a shell script inside a sandbox.
    Shell { sandbox_id: String, script: Script },
    /// Open a transcription segment channel.
    Transcription {
        model_id: String,
        language: Option<String>,
    },
    /// Nothing to run; the permission verdict is the result.
    None,
}

/// Timestamped lifecycle note on a job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Persistent record of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJob {
    pub id: String,
    pub agent_id: String,
    pub caller: CallerIdentity,
    pub action: ActionType,
    pub resource_id: Option<String>,
    pub channel_id: String,
    pub task_id: Option<String>,
    pub status: JobStatus,
    pub effective_clearance: Clearance,
    pub payload: JobPayload,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub approver: Option<CallerIdentity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub log: Vec<JobLogEntry>,
}

impl AgentJob {
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        caller: CallerIdentity,
        action: ActionType,
        resource_id: Option<String>,
        channel_id: impl Into<String>,
        task_id: Option<String>,
        payload: JobPayload,
    ) -> Self {
        let now = Utc::now();
        let mut job = Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            caller,
            action,
            resource_id,
            channel_id: channel_id.into(),
            task_id,
            status: JobStatus::Queued,
            effective_clearance: Clearance::Unset,
            payload,
            result: None,
            error: None,
            approver: None,
            created_at: now,
            updated_at: now,
            log: Vec::new(),
        };
        job.log("job queued");
        job
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(JobLogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// Transition with legality checking; every transition is logged.
    pub fn advance(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.log(format!("{:?} -> {to:?}", self.status));
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
