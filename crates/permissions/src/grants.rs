use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    action::{ActionType, ResourceKind},
    clearance::Clearance,
};

/// Reserved resource id meaning "every resource of this kind".
pub const ALL_RESOURCES: &str = "*";

/// A single grant: a resource id (or the wildcard) and the ceiling
/// clearance for it. `Unset` falls back to the role's default clearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGrant {
    pub resource_id: String,
    pub clearance: Clearance,
}

impl ResourceGrant {
    #[must_use]
    pub fn new(resource_id: impl Into<String>, clearance: Clearance) -> Self {
        Self {
            resource_id: resource_id.into(),
            clearance,
        }
    }

    #[must_use]
    pub fn wildcard(clearance: Clearance) -> Self {
        Self::new(ALL_RESOURCES, clearance)
    }

    #[must_use]
    pub fn covers(&self, resource_id: &str) -> bool {
        self.resource_id == ALL_RESOURCES || self.resource_id.eq_ignore_ascii_case(resource_id)
    }
}

/// Everything a role says about an agent: default clearance, the global
/// boolean flags, one grant collection per resource kind, and the two
/// approver whitelists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RolePermissions {
    pub default_clearance: Clearance,
    // Global flags
    pub can_create_sub_agents: bool,
    pub can_create_containers: bool,
    pub can_register_info_stores: bool,
    pub can_access_localhost_in_browser: bool,
    pub can_access_localhost_in_cli: bool,
    /// One grant list per resource kind.
    pub grants: HashMap<ResourceKind, Vec<ResourceGrant>>,
    /// Users whose approval satisfies `ApprovedByWhitelistedUser`.
    pub whitelisted_users: Vec<String>,
    /// Agents whose approval satisfies `ApprovedByWhitelistedAgent`.
    pub whitelisted_agents: Vec<String>,
}

impl RolePermissions {
    /// The boolean flag behind a global action.
    #[must_use]
    pub fn global_flag(&self, action: ActionType) -> Option<bool> {
        match action {
            ActionType::CreateSubAgent => Some(self.can_create_sub_agents),
            ActionType::CreateContainer => Some(self.can_create_containers),
            ActionType::RegisterInfoStore => Some(self.can_register_info_stores),
            ActionType::AccessLocalhostInBrowser => Some(self.can_access_localhost_in_browser),
            ActionType::AccessLocalhostInCli => Some(self.can_access_localhost_in_cli),
            _ => None,
        }
    }

    /// Find the grant covering a resource: an exact id match wins over the
    /// wildcard.
    #[must_use]
    pub fn find_grant(&self, kind: ResourceKind, resource_id: &str) -> Option<&ResourceGrant> {
        let grants = self.grants.get(&kind)?;
        grants
            .iter()
            .find(|g| g.resource_id != ALL_RESOURCES && g.covers(resource_id))
            .or_else(|| grants.iter().find(|g| g.resource_id == ALL_RESOURCES))
    }

    /// Lift a grant's clearance through the role default. An `Unset`
    /// default means the action is denied.
    #[must_use]
    pub fn lift(&self, clearance: Clearance) -> Clearance {
        let lifted = if clearance == Clearance::Unset {
            self.default_clearance
        } else {
            clearance
        };
        if lifted == Clearance::Unset {
            Clearance::Denied
        } else {
            lifted
        }
    }

    pub fn add_grant(&mut self, kind: ResourceKind, grant: ResourceGrant) {
        self.grants.entry(kind).or_default().push(grant);
    }
}
