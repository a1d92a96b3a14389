//! The AgentJob lifecycle: the status state machine, the approval
//! suspension path, the shell job worker, and the transcription broadcast
//! hub.

pub mod approvals;
pub mod directory;
pub mod error;
pub mod job;
pub mod service;
pub mod store;
pub mod transcribe;

pub use {
    approvals::{ApprovalDecision, PendingApprovals},
    directory::{AgentRecord, ChannelRecord, ContextRecord, EntityDirectory, TaskRecord, UserRecord},
    error::{Error, Result},
    job::{AgentJob, JobPayload, JobStatus},
    service::{JobService, SubmitRequest},
    store::{JobStore, MemoryJobStore},
    transcribe::{SegmentStream, TranscriptSegment, TranscriptionHub},
};
