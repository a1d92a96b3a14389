use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};

use sharpclaw_permissions::{DefaultResourceSet, PreApproval, RolePermissions, ScopeChain};

use crate::error::{Error, Result};

/// An agent, addressed by id, holding a role by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub role_name: String,
}

/// A human user, addressed by id, holding a role by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub role_name: String,
}

/// A context groups channels and carries context-wide pre-approvals and
/// default resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextRecord {
    pub id: String,
    pub pre_approvals: Vec<PreApproval>,
    pub defaults: DefaultResourceSet,
}

/// A channel lives in at most one context and overrides its grants and
/// default-resource slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelRecord {
    pub id: String,
    pub context_id: Option<String>,
    pub pre_approvals: Vec<PreApproval>,
    pub defaults: DefaultResourceSet,
}

/// A task carries only task-scoped pre-approvals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub pre_approvals: Vec<PreApproval>,
}

/// Identifier-addressed entity records. The agent/channel/context graph is
/// cyclic in spirit, so records hold only ids and are resolved on demand —
/// never owning references both ways.
#[derive(Default)]
pub struct EntityDirectory {
    roles: RwLock<HashMap<String, RolePermissions>>,
    agents: RwLock<HashMap<String, AgentRecord>>,
    users: RwLock<HashMap<String, UserRecord>>,
    contexts: RwLock<HashMap<String, ContextRecord>>,
    channels: RwLock<HashMap<String, ChannelRecord>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl EntityDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_role(&self, name: impl Into<String>, role: RolePermissions) {
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(name.into(), role);
        }
    }

    pub fn register_agent(&self, agent: AgentRecord) {
        if let Ok(mut agents) = self.agents.write() {
            agents.insert(agent.id.clone(), agent);
        }
    }

    pub fn register_user(&self, user: UserRecord) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id.clone(), user);
        }
    }

    pub fn register_context(&self, context: ContextRecord) {
        if let Ok(mut contexts) = self.contexts.write() {
            contexts.insert(context.id.clone(), context);
        }
    }

    pub fn register_channel(&self, channel: ChannelRecord) {
        if let Ok(mut channels) = self.channels.write() {
            channels.insert(channel.id.clone(), channel);
        }
    }

    pub fn register_task(&self, task: TaskRecord) {
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.insert(task.id.clone(), task);
        }
    }

    /// The role permissions an agent operates under.
    pub fn agent_role(&self, agent_id: &str) -> Result<RolePermissions> {
        let role_name = self
            .agents
            .read()
            .ok()
            .and_then(|agents| agents.get(agent_id).map(|a| a.role_name.clone()))
            .ok_or_else(|| Error::UnknownEntity(format!("agent {agent_id}")))?;
        self.roles
            .read()
            .ok()
            .and_then(|roles| roles.get(&role_name).cloned())
            .ok_or_else(|| Error::UnknownEntity(format!("role {role_name}")))
    }

    /// Users holding the same role as the agent — the same-level approver
    /// pool.
    pub fn same_level_users(&self, agent_id: &str) -> Result<Vec<String>> {
        let role_name = self
            .agents
            .read()
            .ok()
            .and_then(|agents| agents.get(agent_id).map(|a| a.role_name.clone()))
            .ok_or_else(|| Error::UnknownEntity(format!("agent {agent_id}")))?;
        Ok(self
            .users
            .read()
            .map(|users| {
                users
                    .values()
                    .filter(|u| u.role_name == role_name)
                    .map(|u| u.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Gather the pre-approval chain and the effective default-resource
    /// set for a channel (and optional task).
    pub fn scope_chain(
        &self,
        channel_id: &str,
        task_id: Option<&str>,
    ) -> Result<(ScopeChain, DefaultResourceSet)> {
        let channel = self
            .channels
            .read()
            .ok()
            .and_then(|channels| channels.get(channel_id).cloned())
            .ok_or_else(|| Error::UnknownEntity(format!("channel {channel_id}")))?;

        let context = match &channel.context_id {
            Some(context_id) => Some(
                self.contexts
                    .read()
                    .ok()
                    .and_then(|contexts| contexts.get(context_id).cloned())
                    .ok_or_else(|| Error::UnknownEntity(format!("context {context_id}")))?,
            ),
            None => None,
        };

        let task = match task_id {
            Some(id) => Some(
                self.tasks
                    .read()
                    .ok()
                    .and_then(|tasks| tasks.get(id).cloned())
                    .ok_or_else(|| Error::UnknownEntity(format!("task {id}")))?,
            ),
            None => None,
        };

        let chain = ScopeChain {
            task: task.map(|t| t.pre_approvals).unwrap_or_default(),
            channel: channel.pre_approvals.clone(),
            context: context
                .as_ref()
                .map(|c| c.pre_approvals.clone())
                .unwrap_or_default(),
        };
        let defaults = match &context {
            Some(context) => DefaultResourceSet::inherited(&channel.defaults, &context.defaults),
            None => channel.defaults.clone(),
        };
        Ok((chain, defaults))
    }
}
