use std::collections::HashMap;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{
    error::{Error, Result},
    job::AgentJob,
};

/// Persistence seam for job records. The relational store lives outside
/// this crate; everything here talks to the trait.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: AgentJob) -> Result<()>;
    async fn get(&self, id: &str) -> Result<AgentJob>;
    async fn update(&self, job: &AgentJob) -> Result<()>;
    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<AgentJob>>;
}

/// In-memory store used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, AgentJob>>,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: AgentJob) -> Result<()> {
        self.jobs.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<AgentJob> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    async fn update(&self, job: &AgentJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(Error::JobNotFound(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list_for_channel(&self, channel_id: &str) -> Result<Vec<AgentJob>> {
        let mut jobs: Vec<AgentJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.channel_id == channel_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}
