use std::time::Duration;

use {
    dashmap::DashMap,
    tokio::sync::oneshot,
    tracing::{debug, warn},
};

use sharpclaw_common::CallerIdentity;

/// How a pending approval was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved { approver: CallerIdentity },
    Denied,
    Cancelled,
    TimedOut,
}

/// The one-shot approval promises keyed by job id.
///
/// At most one live entry per job; resolution removes the entry
/// atomically. A cancelled pending approval resolves as denied-shaped
/// (`Cancelled`), never as approved.
pub struct PendingApprovals {
    pending: DashMap<String, oneshot::Sender<ApprovalDecision>>,
    timeout: Duration,
}

impl Default for PendingApprovals {
    fn default() -> Self {
        Self {
            pending: DashMap::new(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl PendingApprovals {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Register a pending approval. Fails if one is already live for the
    /// job.
    pub fn create(&self, job_id: &str) -> Option<oneshot::Receiver<ApprovalDecision>> {
        if self.pending.contains_key(job_id) {
            warn!(job_id, "approval already pending");
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(job_id.to_string(), tx);
        debug!(job_id, "approval pending");
        Some(rx)
    }

    /// Resolve and remove the pending entry. Returns false when nothing
    /// was pending (already resolved, or never created).
    pub fn resolve(&self, job_id: &str, decision: ApprovalDecision) -> bool {
        match self.pending.remove(job_id) {
            Some((_, tx)) => {
                debug!(job_id, ?decision, "approval resolved");
                let _ = tx.send(decision);
                true
            },
            None => false,
        }
    }

    /// Await a decision with the configured timeout.
    pub async fn wait(
        &self,
        job_id: &str,
        rx: oneshot::Receiver<ApprovalDecision>,
    ) -> ApprovalDecision {
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => {
                warn!(job_id, "approval channel dropped");
                self.pending.remove(job_id);
                ApprovalDecision::Cancelled
            },
            Err(_) => {
                warn!(job_id, "approval timed out");
                self.pending.remove(job_id);
                ApprovalDecision::TimedOut
            },
        }
    }

    #[must_use]
    pub fn is_pending(&self, job_id: &str) -> bool {
        self.pending.contains_key(job_id)
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|e| e.key().clone()).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_resolve_roundtrip() {
        let approvals = PendingApprovals::default();
        let rx = approvals.create("job-1").unwrap();
        assert!(approvals.is_pending("job-1"));

        // Only one live entry per job.
        assert!(approvals.create("job-1").is_none());

        let approver = CallerIdentity::user("alice");
        assert!(approvals.resolve(
            "job-1",
            ApprovalDecision::Approved {
                approver: approver.clone()
            }
        ));
        assert!(!approvals.is_pending("job-1"));
        assert_eq!(
            rx.await.unwrap(),
            ApprovalDecision::Approved { approver }
        );

        // Second resolve is a no-op.
        assert!(!approvals.resolve("job-1", ApprovalDecision::Denied));
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let approvals = PendingApprovals::with_timeout(Duration::from_millis(20));
        let rx = approvals.create("job-t").unwrap();
        let decision = approvals.wait("job-t", rx).await;
        assert_eq!(decision, ApprovalDecision::TimedOut);
        assert!(!approvals.is_pending("job-t"));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_denied_shape() {
        let approvals = PendingApprovals::default();
        let rx = approvals.create("job-c").unwrap();
        approvals.resolve("job-c", ApprovalDecision::Cancelled);
        assert_eq!(rx.await.unwrap(), ApprovalDecision::Cancelled);
    }
}
