use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{action::ActionType, clearance::Clearance};

/// Where a pre-approval or default-resource entry lives. Task beats
/// channel beats context when more than one scope grants the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Task,
    Channel,
    Context,
}

/// A standing grant at some scope: "this action type is auto-approved up
/// to this clearance".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreApproval {
    pub action: ActionType,
    pub granted_clearance: Clearance,
}

/// Per-action default resource ids attached to a channel or context.
/// Channels inherit unset slots from their context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultResourceSet {
    pub defaults: HashMap<ActionType, String>,
}

impl DefaultResourceSet {
    #[must_use]
    pub fn get(&self, action: ActionType) -> Option<&str> {
        self.defaults.get(&action).map(String::as_str)
    }

    pub fn set(&mut self, action: ActionType, resource_id: impl Into<String>) {
        self.defaults.insert(action, resource_id.into());
    }

    /// Channel view over a context: the channel's own slots win, unset
    /// slots fall through to the context.
    #[must_use]
    pub fn inherited(channel: &DefaultResourceSet, context: &DefaultResourceSet) -> Self {
        let mut merged = context.clone();
        for (action, resource) in &channel.defaults {
            merged.defaults.insert(*action, resource.clone());
        }
        merged
    }
}

/// The pre-approval grants in effect for one job, already gathered from
/// the task, channel, and context it runs in.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    pub task: Vec<PreApproval>,
    pub channel: Vec<PreApproval>,
    pub context: Vec<PreApproval>,
}

impl ScopeChain {
    /// Most specific grant for an action: task, then channel, then
    /// context.
    #[must_use]
    pub fn auto_approved(&self, action: ActionType) -> Option<(Scope, Clearance)> {
        let find = |grants: &[PreApproval]| {
            grants
                .iter()
                .find(|g| g.action == action)
                .map(|g| g.granted_clearance)
        };
        if let Some(clearance) = find(&self.task) {
            return Some((Scope::Task, clearance));
        }
        if let Some(clearance) = find(&self.channel) {
            return Some((Scope::Channel, clearance));
        }
        find(&self.context).map(|clearance| (Scope::Context, clearance))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn grant(action: ActionType, clearance: Clearance) -> PreApproval {
        PreApproval {
            action,
            granted_clearance: clearance,
        }
    }

    #[test]
    fn test_most_specific_scope_wins() {
        let chain = ScopeChain {
            task: vec![grant(ActionType::ExecuteSafeShell, Clearance::Independent)],
            channel: vec![grant(
                ActionType::ExecuteSafeShell,
                Clearance::ApprovedBySameLevelUser,
            )],
            context: vec![
                grant(ActionType::ExecuteSafeShell, Clearance::Denied),
                grant(ActionType::AccessWebsite, Clearance::Independent),
            ],
        };
        assert_eq!(
            chain.auto_approved(ActionType::ExecuteSafeShell),
            Some((Scope::Task, Clearance::Independent))
        );
        // Context applies when no narrower scope grants the action.
        assert_eq!(
            chain.auto_approved(ActionType::AccessWebsite),
            Some((Scope::Context, Clearance::Independent))
        );
        assert_eq!(chain.auto_approved(ActionType::RunTask), None);
    }

    #[test]
    fn test_default_resource_inheritance() {
        let mut context = DefaultResourceSet::default();
        context.set(ActionType::ExecuteSafeShell, "shared-sandbox");
        context.set(ActionType::AccessWebsite, "docs.example.com");
        let mut channel = DefaultResourceSet::default();
        channel.set(ActionType::ExecuteSafeShell, "channel-sandbox");

        let effective = DefaultResourceSet::inherited(&channel, &context);
        assert_eq!(
            effective.get(ActionType::ExecuteSafeShell),
            Some("channel-sandbox")
        );
        assert_eq!(
            effective.get(ActionType::AccessWebsite),
            Some("docs.example.com")
        );
        assert_eq!(effective.get(ActionType::RunTask), None);
    }
}
