use std::sync::Arc;

use {
    dashmap::DashMap,
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    sharpclaw_common::CallerIdentity,
    sharpclaw_permissions::{
        ActionType, ResolveRequest, Verdict, approver_eligible, resolve,
    },
    sharpclaw_shell::{Executor, SandboxRegistry, TaskContainer, compile, script::FragmentRegistry},
};

use crate::{
    approvals::{ApprovalDecision, PendingApprovals},
    directory::EntityDirectory,
    error::{Error, Result},
    job::{AgentJob, JobPayload, JobStatus},
    store::JobStore,
    transcribe::TranscriptionHub,
};

/// A tool invocation entering the lifecycle. Submission is channel-scoped;
/// the task id only narrows the pre-approval chain.
pub struct SubmitRequest {
    pub caller: CallerIdentity,
    pub agent_id: String,
    pub action: ActionType,
    pub resource_id: Option<String>,
    pub channel_id: String,
    pub task_id: Option<String>,
    pub payload: JobPayload,
}

/// Orchestrates submit → permission check → (deny | execute | suspend),
/// approval resumption, cancellation, and the per-job workers.
///
/// Every field is shared state behind an `Arc`, so the service itself is
/// cheap to clone into worker tasks.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    directory: Arc<EntityDirectory>,
    pub pending: Arc<PendingApprovals>,
    pub transcripts: Arc<TranscriptionHub>,
    sandbox_registry: Arc<SandboxRegistry>,
    fragments: Arc<FragmentRegistry>,
    cancel_tokens: Arc<DashMap<String, CancellationToken>>,
    watchers: Arc<DashMap<String, watch::Sender<JobStatus>>>,
}

impl JobService {
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        directory: Arc<EntityDirectory>,
        sandbox_registry: Arc<SandboxRegistry>,
        fragments: Arc<FragmentRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            directory,
            pending: Arc::new(PendingApprovals::default()),
            transcripts: Arc::new(TranscriptionHub::new()),
            sandbox_registry,
            fragments,
            cancel_tokens: Arc::new(DashMap::new()),
            watchers: Arc::new(DashMap::new()),
        })
    }

    pub async fn get(&self, job_id: &str) -> Result<AgentJob> {
        self.store.get(job_id).await
    }

    pub async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<AgentJob>> {
        self.store.list_for_channel(channel_id).await
    }

    async fn persist(&self, job: &AgentJob) -> Result<()> {
        self.store.update(job).await?;
        if let Some(watcher) = self.watchers.get(&job.id) {
            let _ = watcher.send(job.status);
        }
        Ok(())
    }

    /// Submit a new job. Returns the job after the permission verdict has
    /// been applied: `Denied`, `Executing`, or `AwaitingApproval`.
    pub async fn submit(&self, request: SubmitRequest) -> Result<AgentJob> {
        let mut job = AgentJob::new(
            request.agent_id,
            request.caller,
            request.action,
            request.resource_id,
            request.channel_id,
            request.task_id,
            request.payload,
        );
        let (tx, _) = watch::channel(job.status);
        self.watchers.insert(job.id.clone(), tx);
        self.store.insert(job.clone()).await?;
        info!(job_id = %job.id, action = ?job.action, "job submitted");

        job.advance(JobStatus::PermissionCheck)?;
        self.persist(&job).await?;

        let role = self.directory.agent_role(&job.agent_id)?;
        let (scopes, defaults) = self
            .directory
            .scope_chain(&job.channel_id, job.task_id.as_deref())?;
        let verdict = resolve(&ResolveRequest {
            role: &role,
            action: job.action,
            resource_id: job.resource_id.as_deref(),
            scopes: &scopes,
            defaults: Some(&defaults),
        });

        match verdict {
            Verdict::Deny { reason } => {
                job.advance(JobStatus::Denied)?;
                job.error = Some(reason.clone());
                job.log(format!("denied: {reason}"));
                self.persist(&job).await?;
            },
            Verdict::Execute {
                effective,
                auto_approved_by,
            } => {
                job.effective_clearance = effective;
                if let Some(scope) = auto_approved_by {
                    job.log(format!("auto-approved by {scope:?} pre-approval"));
                }
                job.advance(JobStatus::Executing)?;
                self.persist(&job).await?;
                self.spawn_worker(job.clone());
            },
            Verdict::AwaitApproval { effective } => {
                job.effective_clearance = effective;
                job.advance(JobStatus::AwaitingApproval)?;
                self.persist(&job).await?;
                self.suspend_for_approval(&job);
            },
        }
        Ok(job)
    }

    /// Park the job on a one-shot approval promise; a timer resolves it as
    /// timed out if nobody does.
    fn suspend_for_approval(&self, job: &AgentJob) {
        let Some(rx) = self.pending.create(&job.id) else {
            return;
        };
        let service = self.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let decision = service.pending.wait(&job_id, rx).await;
            match decision {
                // `approve` already performed the transition.
                ApprovalDecision::Approved { .. } => {},
                ApprovalDecision::Denied
                | ApprovalDecision::Cancelled
                | ApprovalDecision::TimedOut => {
                    debug!(job_id, ?decision, "pending approval resolved negative");
                    if let Err(e) = service.cancel_internal(&job_id).await {
                        warn!(job_id, error = %e, "could not cancel unapproved job");
                    }
                },
            }
        });
    }

    /// Approve a suspended job. The approver must be eligible for the
    /// job's effective clearance; an ineligible approver leaves the job
    /// suspended and returns a permission error.
    pub async fn approve(&self, job_id: &str, approver: CallerIdentity) -> Result<AgentJob> {
        let mut job = self.store.get(job_id).await?;
        if job.status != JobStatus::AwaitingApproval {
            return Err(Error::IllegalTransition {
                from: job.status,
                to: JobStatus::Executing,
            });
        }
        let role = self.directory.agent_role(&job.agent_id)?;
        let same_level = self.directory.same_level_users(&job.agent_id)?;
        if !approver_eligible(job.effective_clearance, &approver, &role, &same_level) {
            return Err(Error::ApproverNotEligible(format!(
                "{approver} cannot satisfy {:?}",
                job.effective_clearance
            )));
        }

        job.approver = Some(approver.clone());
        job.log(format!("approved by {approver}"));
        job.advance(JobStatus::Executing)?;
        self.persist(&job).await?;
        self.pending
            .resolve(job_id, ApprovalDecision::Approved { approver });
        self.spawn_worker(job.clone());
        Ok(job)
    }

    /// Deny a suspended job; any caller may reject, which cancels it.
    pub async fn deny(&self, job_id: &str) -> Result<AgentJob> {
        self.pending.resolve(job_id, ApprovalDecision::Denied);
        self.cancel_internal(job_id).await
    }

    /// Cancel from any non-terminal state. The worker observes the token
    /// at its next suspension point.
    pub async fn cancel(&self, job_id: &str) -> Result<AgentJob> {
        self.pending.resolve(job_id, ApprovalDecision::Cancelled);
        self.cancel_internal(job_id).await
    }

    async fn cancel_internal(&self, job_id: &str) -> Result<AgentJob> {
        let mut job = self.store.get(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        job.advance(JobStatus::Cancelled)?;
        self.persist(&job).await?;
        if let Some((_, token)) = self.cancel_tokens.remove(job_id) {
            token.cancel();
        }
        if matches!(job.payload, JobPayload::Transcription { .. }) {
            self.transcripts.close(job_id);
        }
        info!(job_id, "job cancelled");
        Ok(job)
    }

    /// Stop a transcription job cleanly: the channel closes and the job
    /// completes.
    pub async fn stop_transcription(&self, job_id: &str) -> Result<AgentJob> {
        let mut job = self.store.get(job_id).await?;
        if !matches!(job.payload, JobPayload::Transcription { .. }) {
            return Err(Error::message("not a transcription job"));
        }
        self.transcripts.close(job_id);
        job.advance(JobStatus::Completed)?;
        self.persist(&job).await?;
        Ok(job)
    }

    /// Await the end of an approval suspension: the next state that is
    /// either `Executing` or terminal.
    pub async fn wait_past_approval(&self, job_id: &str) -> Result<AgentJob> {
        let mut rx = match self.watchers.get(job_id) {
            Some(watcher) => watcher.subscribe(),
            None => return self.store.get(job_id).await,
        };
        loop {
            let job = self.store.get(job_id).await?;
            if job.status != JobStatus::AwaitingApproval {
                return Ok(job);
            }
            if rx.changed().await.is_err() {
                return self.store.get(job_id).await;
            }
        }
    }

    /// Await a terminal status.
    pub async fn wait_terminal(&self, job_id: &str) -> Result<AgentJob> {
        let mut rx = match self.watchers.get(job_id) {
            Some(watcher) => watcher.subscribe(),
            None => return self.store.get(job_id).await,
        };
        loop {
            let job = self.store.get(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if rx.changed().await.is_err() {
                return self.store.get(job_id).await;
            }
        }
    }

    fn spawn_worker(&self, job: AgentJob) {
        match &job.payload {
            JobPayload::Shell { .. } => {
                let token = CancellationToken::new();
                self.cancel_tokens.insert(job.id.clone(), token.clone());
                let service = self.clone();
                tokio::spawn(async move {
                    service.run_shell_job(job, token).await;
                });
            },
            JobPayload::Transcription { .. } => {
                self.transcripts.open(&job.id);
            },
            JobPayload::None => {
                let service = self.clone();
                tokio::spawn(async move {
                    let mut job = job;
                    if job.advance(JobStatus::Completed).is_ok() {
                        let _ = service.persist(&job).await;
                    }
                });
            },
        }
    }

    /// The shell worker: container → compile → execute → result payload.
    async fn run_shell_job(&self, job: AgentJob, token: CancellationToken) {
        let JobPayload::Shell { sandbox_id, script } = &job.payload else {
            return;
        };
        let run = async {
            let container = TaskContainer::create(&self.sandbox_registry, sandbox_id)?;
            let compiled = compile(script, &container.workspace.variables, &self.fragments)?;
            let outcome = Executor::new(container).run(compiled, token.clone()).await?;
            Ok::<_, sharpclaw_shell::Error>(outcome)
        };
        let result = run.await;

        // Reload: a cancel may have landed while the worker ran.
        let Ok(mut job) = self.store.get(&job.id).await else {
            return;
        };
        self.cancel_tokens.remove(&job.id);
        if job.status.is_terminal() {
            return;
        }

        match result {
            Ok(outcome) => {
                let steps: Vec<serde_json::Value> = outcome
                    .steps
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "index": s.index,
                            "verb": s.verb.name(),
                            "status": format!("{:?}", s.status),
                            "attempts": s.attempts,
                            "error": s.error,
                        })
                    })
                    .collect();
                job.result = Some(serde_json::json!({
                    "success": outcome.success,
                    "finalOutput": outcome.final_output,
                    "captures": outcome.captures,
                    "cleanupRan": outcome.cleanup_ran,
                    "steps": steps,
                }));
                let next = if outcome.success {
                    JobStatus::Completed
                } else {
                    job.error = outcome
                        .steps
                        .iter()
                        .rev()
                        .find_map(|s| s.error.clone());
                    JobStatus::Failed
                };
                if job.advance(next).is_ok() {
                    let _ = self.persist(&job).await;
                }
            },
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "shell job errored");
                job.error = Some(e.to_string());
                if job.advance(JobStatus::Failed).is_ok() {
                    let _ = self.persist(&job).await;
                }
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            directory::{AgentRecord, ChannelRecord, UserRecord},
            store::MemoryJobStore,
        },
        sharpclaw_permissions::{
            Clearance, ResourceGrant, ResourceKind, RolePermissions,
        },
        sharpclaw_shell::script::{Operation, Script, Verb},
    };

    struct Fixture {
        _app: tempfile::TempDir,
        _sand: tempfile::TempDir,
        service: Arc<JobService>,
    }

    impl Fixture {
        fn new(role: RolePermissions, channel: ChannelRecord) -> Self {
            let app = tempfile::tempdir().unwrap();
            let sand = tempfile::tempdir().unwrap();
            write_sandbox(app.path(), sand.path());

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
            directory.register_user(UserRecord {
                id: "eve".into(),
                role_name: "viewer".into(),
            });
            directory.register_channel(channel);

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
    }

    /// Mirror of the out-of-band startup tool: registry entry, key file,
    /// and a signed env in the sandbox root.
    fn write_sandbox(app: &std::path::Path, sand: &std::path::Path) {
        let key = [42u8; 32];
        std::fs::write(app.join("mk8.shell.key"), key).unwrap();
        let signed = sharpclaw_shell::sandbox::sign("", &key).unwrap();
        std::fs::write(sand.join("mk8.signed.env"), signed).unwrap();
        let body = serde_json::json!({
            "demo": { "rootPath": sand, "registeredAtUtc": "2026-01-01T00:00:00Z" }
        });
        std::fs::write(app.join("sandboxes.json"), body.to_string()).unwrap();
    }

    fn shell_role(clearance: Clearance) -> RolePermissions {
        let mut role = RolePermissions::default();
        role.add_grant(
            ResourceKind::SafeShell,
            ResourceGrant::new("demo", clearance),
        );
        role
    }

    fn channel() -> ChannelRecord {
        ChannelRecord {
            id: "ch-1".into(),
            ..ChannelRecord::default()
        }
    }

    fn shell_request(resource: &str) -> SubmitRequest {
        SubmitRequest {
            caller: CallerIdentity::user("bob"),
            agent_id: "agent-1".into(),
            action: ActionType::ExecuteSafeShell,
            resource_id: Some(resource.into()),
            channel_id: "ch-1".into(),
            task_id: None,
            payload: JobPayload::Shell {
                sandbox_id: "demo".into(),
                script: Script {
                    operations: vec![Operation::new(Verb::Echo, &["ran inside sandbox"])],
                    ..Script::default()
                },
            },
        }
    }

    #[tokio::test]
    async fn test_denied_without_grant() {
        let f = Fixture::new(RolePermissions::default(), channel());
        let job = f.service.submit(shell_request("demo")).await.unwrap();
        assert_eq!(job.status, JobStatus::Denied);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn test_independent_executes_to_completion() {
        let f = Fixture::new(shell_role(Clearance::Independent), channel());
        let job = f.service.submit(shell_request("demo")).await.unwrap();
        assert_eq!(job.status, JobStatus::Executing);
        let done = f.service.wait_terminal(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        let result = done.result.unwrap();
        assert_eq!(result["finalOutput"], "ran inside sandbox");
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let f = Fixture::new(shell_role(Clearance::ApprovedBySameLevelUser), channel());
        let job = f.service.submit(shell_request("demo")).await.unwrap();
        assert_eq!(job.status, JobStatus::AwaitingApproval);

        // An ineligible user gets a permission error; the job stays put.
        let err = f
            .service
            .approve(&job.id, CallerIdentity::user("eve"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ApproverNotEligible(_)));
        assert_eq!(
            f.service.get(&job.id).await.unwrap().status,
            JobStatus::AwaitingApproval
        );

        // A same-level user approves; the worker resumes and completes.
        let approved = f
            .service
            .approve(&job.id, CallerIdentity::user("bob"))
            .await
            .unwrap();
        assert_eq!(approved.status, JobStatus::Executing);
        let done = f.service.wait_terminal(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.approver, Some(CallerIdentity::user("bob")));
    }

    #[tokio::test]
    async fn test_pre_approval_skips_suspension() {
        let mut ch = channel();
        ch.pre_approvals.push(sharpclaw_permissions::PreApproval {
            action: ActionType::ExecuteSafeShell,
            granted_clearance: Clearance::ApprovedBySameLevelUser,
        });
        let f = Fixture::new(shell_role(Clearance::ApprovedBySameLevelUser), ch);
        let job = f.service.submit(shell_request("demo")).await.unwrap();
        assert_eq!(job.status, JobStatus::Executing);
        let done = f.service.wait_terminal(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_pending_approval() {
        let f = Fixture::new(shell_role(Clearance::ApprovedBySameLevelUser), channel());
        let job = f.service.submit(shell_request("demo")).await.unwrap();
        let cancelled = f.service.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        // Approving afterwards is an illegal transition.
        assert!(
            f.service
                .approve(&job.id, CallerIdentity::user("bob"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_shell_failure_is_failed() {
        let f = Fixture::new(shell_role(Clearance::Independent), channel());
        let mut request = shell_request("demo");
        request.payload = JobPayload::Shell {
            sandbox_id: "demo".into(),
            script: Script {
                operations: vec![Operation::new(Verb::Fail, &["deliberate"])],
                ..Script::default()
            },
        };
        let job = f.service.submit(request).await.unwrap();
        let done = f.service.wait_terminal(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("deliberate"));
    }

    #[tokio::test]
    async fn test_unknown_sandbox_fails_job() {
        let f = Fixture::new(shell_role(Clearance::Independent), channel());
        let mut request = shell_request("demo");
        request.payload = JobPayload::Shell {
            sandbox_id: "ghost".into(),
            script: Script::default(),
        };
        let job = f.service.submit(request).await.unwrap();
        let done = f.service.wait_terminal(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("sandbox not found"));
    }

    #[tokio::test]
    async fn test_transcription_lifecycle() {
        let mut role = RolePermissions::default();
        role.add_grant(
            ResourceKind::AudioDevice,
            ResourceGrant::wildcard(Clearance::Independent),
        );
        let f = Fixture::new(role, channel());
        let job = f
            .service
            .submit(SubmitRequest {
                caller: CallerIdentity::user("bob"),
                agent_id: "agent-1".into(),
                action: ActionType::TranscribeFromAudioDevice,
                resource_id: None,
                channel_id: "ch-1".into(),
                task_id: None,
                payload: JobPayload::Transcription {
                    model_id: "whisper-small".into(),
                    language: Some("en".into()),
                },
            })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Executing);

        f.service
            .transcripts
            .publish(
                &job.id,
                crate::transcribe::TranscriptSegment {
                    text: "hello".into(),
                    start_time: 0.0,
                    end_time: 1.0,
                    confidence: None,
                    timestamp: chrono::Utc::now(),
                },
            )
            .unwrap();
        let mut stream = f.service.transcripts.subscribe(&job.id).unwrap();
        assert_eq!(stream.next().await.unwrap().text, "hello");

        let stopped = f.service.stop_transcription(&job.id).await.unwrap();
        assert_eq!(stopped.status, JobStatus::Completed);
        assert!(stream.next().await.is_none());
    }
}
