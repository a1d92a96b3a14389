use std::sync::Arc;

use {
    serde::Deserialize,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    sharpclaw_common::CallerIdentity,
    sharpclaw_jobs::{AgentJob, JobPayload, JobService, JobStatus, SubmitRequest},
    sharpclaw_permissions::ActionType,
    sharpclaw_protocol::{
        ApprovalOutcome, ChatEvent, JobRef, PendingJobRef, ToolResultRef, parse_tool_call,
    },
    sharpclaw_shell::Script,
};

use crate::error::{Error, Result};

/// JSON body of a `[TOOL_CALL:<id>]` line.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ToolCallBody {
    action: ActionType,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    sandbox_id: Option<String>,
    #[serde(default)]
    script: Option<Script>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

/// One chat turn's streaming pipeline: single producer (this runtime),
/// single consumer (the transport).
pub struct ChatStream {
    service: Arc<JobService>,
    agent_id: String,
    channel_id: String,
    caller: CallerIdentity,
}

impl ChatStream {
    #[must_use]
    pub fn new(
        service: Arc<JobService>,
        agent_id: impl Into<String>,
        channel_id: impl Into<String>,
        caller: CallerIdentity,
    ) -> Self {
        Self {
            service,
            agent_id: agent_id.into(),
            channel_id: channel_id.into(),
            caller,
        }
    }

    /// Drive a model-output stream to completion. Text lines become
    /// `TextDelta` events; tool-call lines run the full job lifecycle,
    /// suspending this stream while a job waits for approval. A cancelled
    /// stream cancels its in-flight job before returning.
    pub async fn run(
        &self,
        mut input: mpsc::Receiver<String>,
        events: mpsc::Sender<ChatEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut pending_line = String::new();
        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = input.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            pending_line.push_str(&chunk);
            while let Some(newline) = pending_line.find('\n') {
                let line: String = pending_line.drain(..=newline).collect();
                self.handle_line(line.trim_end_matches('\n'), &events, &cancel)
                    .await?;
            }
        }
        if !pending_line.is_empty() {
            self.handle_line(&pending_line, &events, &cancel).await?;
        }
        let _ = events.send(ChatEvent::Done).await;
        Ok(())
    }

    async fn handle_line(
        &self,
        line: &str,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match parse_tool_call(line) {
            None => {
                if !line.is_empty() {
                    let _ = events
                        .send(ChatEvent::TextDelta {
                            delta: format!("{line}\n"),
                        })
                        .await;
                }
                Ok(())
            },
            Some(Err(reason)) => {
                warn!(reason, "malformed tool call");
                let _ = events.send(ChatEvent::Error { error: reason }).await;
                Ok(())
            },
            Some(Ok(call)) => self.run_tool_call(call.body, events, cancel).await,
        }
    }

    async fn run_tool_call(
        &self,
        body: serde_json::Value,
        events: &mpsc::Sender<ChatEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let body: ToolCallBody = match serde_json::from_value(body) {
            Ok(body) => body,
            Err(e) => {
                let _ = events
                    .send(ChatEvent::Error {
                        error: format!("bad tool call: {e}"),
                    })
                    .await;
                return Ok(());
            },
        };

        let payload = match (&body.script, &body.model_id) {
            (Some(script), _) => JobPayload::Shell {
                sandbox_id: body.sandbox_id.clone().unwrap_or_default(),
                script: script.clone(),
            },
            (None, Some(model_id)) => JobPayload::Transcription {
                model_id: model_id.clone(),
                language: body.language.clone(),
            },
            (None, None) => JobPayload::None,
        };

        let job = match self
            .service
            .submit(SubmitRequest {
                caller: self.caller.clone(),
                agent_id: self.agent_id.clone(),
                action: body.action,
                resource_id: body.resource_id,
                channel_id: self.channel_id.clone(),
                task_id: body.task_id,
                payload,
            })
            .await
        {
            Ok(job) => job,
            Err(e) => {
                let _ = events
                    .send(ChatEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                return Ok(());
            },
        };
        info!(job_id = %job.id, status = ?job.status, "tool call dispatched");
        let _ = events
            .send(ChatEvent::ToolCallStart {
                job: job_ref(&job),
            })
            .await;

        let mut current = job;
        if current.status == JobStatus::AwaitingApproval {
            let _ = events
                .send(ChatEvent::ApprovalRequired {
                    pending_job: PendingJobRef {
                        id: current.id.clone(),
                        action_type: action_name(current.action),
                    },
                })
                .await;
            // Suspend until the companion endpoint (or its timeout)
            // resolves the pending promise.
            current = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(job_id = %current.id, "stream cancelled during approval wait");
                    let _ = self.service.cancel(&current.id).await;
                    return Err(Error::Cancelled);
                },
                job = self.service.wait_past_approval(&current.id) => job?,
            };
            let outcome = match current.status {
                JobStatus::Cancelled => "Cancelled",
                JobStatus::Denied => "Denied",
                _ => "Approved",
            };
            let _ = events
                .send(ChatEvent::ApprovalResult {
                    approval_outcome: ApprovalOutcome {
                        status: outcome.to_string(),
                    },
                })
                .await;
        }

        if !current.status.is_terminal() {
            current = tokio::select! {
                () = cancel.cancelled() => {
                    let _ = self.service.cancel(&current.id).await;
                    return Err(Error::Cancelled);
                },
                job = self.service.wait_terminal(&current.id) => job?,
            };
        }
        let _ = events
            .send(ChatEvent::ToolCallResult {
                result: ToolResultRef {
                    id: current.id.clone(),
                    status: format!("{:?}", current.status),
                },
            })
            .await;
        Ok(())
    }
}

fn job_ref(job: &AgentJob) -> JobRef {
    JobRef {
        id: job.id.clone(),
        action_type: action_name(job.action),
        status: format!("{:?}", job.status),
    }
}

fn action_name(action: ActionType) -> String {
    serde_json::to_value(action)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{action:?}"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        sharpclaw_jobs::{
            AgentRecord, ChannelRecord, EntityDirectory, MemoryJobStore, UserRecord,
        },
        sharpclaw_permissions::{Clearance, ResourceGrant, ResourceKind, RolePermissions},
        sharpclaw_shell::{SandboxRegistry, sandbox, script::FragmentRegistry},
    };

    struct Fixture {
        _app: tempfile::TempDir,
        _sand: tempfile::TempDir,
        service: Arc<JobService>,
    }

    fn write_sandbox(app: &std::path::Path, sand: &std::path::Path) {
        let key = [9u8; 32];
        std::fs::write(app.join("mk8.shell.key"), key).unwrap();
        let signed = sandbox::sign("", &key).unwrap();
        std::fs::write(sand.join("mk8.signed.env"), signed).unwrap();
        let body = serde_json::json!({
            "demo": { "rootPath": sand, "registeredAtUtc": "2026-01-01T00:00:00Z" }
        });
        std::fs::write(app.join("sandboxes.json"), body.to_string()).unwrap();
    }

    impl Fixture {
        fn new(clearance: Clearance) -> Self {
            let app = tempfile::tempdir().unwrap();
            let sand = tempfile::tempdir().unwrap();
            write_sandbox(app.path(), sand.path());

            let mut role = RolePermissions::default();
            role.add_grant(
                ResourceKind::SafeShell,
                ResourceGrant::new("demo", clearance),
            );
            let directory = Arc::new(EntityDirectory::new());
            directory.register_role("operator", role);
            directory.register_agent(AgentRecord {
                id: "agent-1".into(),
                name: "helper".into(),
                role_name: "operator".into(),
            });
            directory.register_user(UserRecord {
                id: "bob".into(),
                role_name: "operator".into(),
            });
            directory.register_channel(ChannelRecord {
                id: "ch-1".into(),
                ..ChannelRecord::default()
            });

            let service = JobService::new(
                Arc::new(MemoryJobStore::new()),
                directory,
                Arc::new(SandboxRegistry::open(app.path())),
                Arc::new(FragmentRegistry::new()),
            );
            Self {
                _app: app,
                _sand: sand,
                service,
            }
        }

        fn stream(&self) -> ChatStream {
            ChatStream::new(
                Arc::clone(&self.service),
                "agent-1",
                "ch-1",
                CallerIdentity::user("bob"),
            )
        }
    }

    async fn collect(
        stream: &ChatStream,
        lines: Vec<String>,
    ) -> Vec<ChatEvent> {
        let (input_tx, input_rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        for line in lines {
            input_tx.send(line).await.unwrap();
        }
        drop(input_tx);
        stream
            .run(input_rx, event_tx, CancellationToken::new())
            .await
            .unwrap();
        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    const SHELL_CALL: &str = concat!(
        r#"[TOOL_CALL:c1] {"action":"executeSafeShell","resourceId":"demo","sandboxId":"demo","#,
        r#""script":{"operations":[{"verb":"Echo","args":["from the sandbox"]}]}}"#,
        "\n"
    );

    #[tokio::test]
    async fn test_text_and_tool_flow() {
        let f = Fixture::new(Clearance::Independent);
        let events = collect(
            &f.stream(),
            vec!["thinking about it\n".into(), SHELL_CALL.into()],
        )
        .await;

        assert!(matches!(&events[0], ChatEvent::TextDelta { delta } if delta.contains("thinking")));
        assert!(matches!(&events[1], ChatEvent::ToolCallStart { job } if job.status == "Executing"));
        assert!(
            matches!(&events[2], ChatEvent::ToolCallResult { result } if result.status == "Completed")
        );
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[tokio::test]
    async fn test_denied_tool_call() {
        let f = Fixture::new(Clearance::Denied);
        let events = collect(&f.stream(), vec![SHELL_CALL.into()]).await;
        assert!(
            matches!(&events[1], ChatEvent::ToolCallResult { result } if result.status == "Denied")
        );
    }

    #[tokio::test]
    async fn test_approval_suspends_and_resumes() {
        let f = Fixture::new(Clearance::ApprovedBySameLevelUser);
        let service = Arc::clone(&f.service);

        // Companion endpoint: approve the first pending job it sees.
        let approver = tokio::spawn(async move {
            loop {
                let ids = service.pending.pending_ids();
                if let Some(id) = ids.first() {
                    service
                        .approve(id, CallerIdentity::user("bob"))
                        .await
                        .unwrap();
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });

        let events = collect(&f.stream(), vec![SHELL_CALL.into()]).await;
        approver.await.unwrap();

        let kinds: Vec<&'static str> = events.iter().map(ChatEvent::type_name).collect();
        assert_eq!(
            kinds,
            vec![
                "ToolCallStart",
                "ApprovalRequired",
                "ApprovalResult",
                "ToolCallResult",
                "Done"
            ]
        );
        assert!(
            matches!(&events[3], ChatEvent::ToolCallResult { result } if result.status == "Completed")
        );
    }

    #[tokio::test]
    async fn test_malformed_call_is_error_event() {
        let f = Fixture::new(Clearance::Independent);
        let events = collect(&f.stream(), vec!["[TOOL_CALL:x] {broken\n".into()]).await;
        assert!(matches!(&events[0], ChatEvent::Error { .. }));
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[tokio::test]
    async fn test_cancel_aborts_stream_and_job() {
        let f = Fixture::new(Clearance::ApprovedBySameLevelUser);
        let (input_tx, input_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        input_tx.send(SHELL_CALL.to_string()).await.unwrap();

        let cancel = CancellationToken::new();
        let stream = f.stream();
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move {
            stream.run(input_rx, event_tx, cancel2).await
        });

        // Wait for the approval suspension, then disconnect the client.
        loop {
            if !f.service.pending.pending_ids().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));

        // The suspended job was cancelled with the stream.
        let mut saw_cancelled = false;
        while let Ok(event) = event_rx.try_recv() {
            if let ChatEvent::ToolCallStart { job } = event {
                let loaded = f.service.get(&job.id).await.unwrap();
                saw_cancelled = loaded.status == JobStatus::Cancelled;
            }
        }
        assert!(saw_cancelled);
    }
}
