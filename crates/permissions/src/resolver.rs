use tracing::debug;

use sharpclaw_common::CallerIdentity;

use crate::{
    action::ActionType,
    clearance::Clearance,
    error::{Error, Result},
    grants::{ALL_RESOURCES, RolePermissions},
    preapproval::{DefaultResourceSet, Scope, ScopeChain},
};

/// One permission question: may this agent perform this action on this
/// resource, in this scope chain?
pub struct ResolveRequest<'a> {
    pub role: &'a RolePermissions,
    pub action: ActionType,
    /// Explicit resource id; falls back to the channel/context default
    /// resource set, then the wildcard.
    pub resource_id: Option<&'a str>,
    pub scopes: &'a ScopeChain,
    pub defaults: Option<&'a DefaultResourceSet>,
}

/// Resolver output. `AwaitApproval` carries the clearance the eventual
/// approver must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Execute {
        effective: Clearance,
        /// Scope of the pre-approval that auto-approved it, if one did.
        auto_approved_by: Option<Scope>,
    },
    AwaitApproval {
        effective: Clearance,
    },
    Deny {
        reason: String,
    },
}

/// The five-step resolution algorithm: grant lookup, clearance lift,
/// pre-approval intersection, effective clearance, verdict.
#[must_use]
pub fn resolve(request: &ResolveRequest<'_>) -> Verdict {
    let ResolveRequest {
        role,
        action,
        resource_id,
        scopes,
        defaults,
    } = request;

    // 1. Resolve the grant.
    let granted = if let Some(flag) = role.global_flag(*action) {
        if !flag {
            return Verdict::Deny {
                reason: format!("role does not allow {action:?}"),
            };
        }
        // Global actions carry no per-resource clearance; the role default
        // decides via the lift.
        Clearance::Unset
    } else {
        let kind = action
            .resource_kind()
            .unwrap_or_else(|| unreachable!("non-global actions have a resource kind"));
        let effective_id = resource_id
            .or_else(|| defaults.and_then(|d| d.get(*action)))
            .unwrap_or(ALL_RESOURCES);
        match role.find_grant(kind, effective_id) {
            Some(grant) => grant.clearance,
            None => {
                return Verdict::Deny {
                    reason: format!("no grant for {action:?} on {effective_id:?}"),
                };
            },
        }
    };

    // 2. Lift through the role default.
    let lifted = role.lift(granted);

    // 3. Intersect with the most specific pre-approval.
    let auto = scopes.auto_approved(*action);

    // 4. Effective clearance is the lesser of the two.
    let effective = match auto {
        Some((_, granted_clearance)) => lifted.intersect(granted_clearance),
        None => lifted,
    };
    debug!(?action, ?lifted, ?auto, ?effective, "clearance resolved");

    // 5. Verdict.
    match effective {
        Clearance::Unset | Clearance::Denied => Verdict::Deny {
            reason: format!("{action:?} resolves to {effective:?}"),
        },
        Clearance::Independent | Clearance::AlwaysApproved => Verdict::Execute {
            effective,
            auto_approved_by: None,
        },
        Clearance::ApprovedByWhitelistedAgent
        | Clearance::ApprovedBySameLevelUser
        | Clearance::ApprovedByWhitelistedUser => match auto {
            // A standing pre-approval covers the action; no human needed.
            Some((scope, _)) => Verdict::Execute {
                effective,
                auto_approved_by: Some(scope),
            },
            None => Verdict::AwaitApproval { effective },
        },
    }
}

/// Whether `approver` satisfies the clearance a suspended job demands.
///
/// Trust is ordered: a whitelisted user can approve anything an approval
/// clearance asks for, a same-level user everything up to
/// `ApprovedBySameLevelUser`, a whitelisted agent only agent-level asks.
#[must_use]
pub fn approver_eligible(
    required: Clearance,
    approver: &CallerIdentity,
    role: &RolePermissions,
    same_level_users: &[String],
) -> bool {
    let is_whitelisted_user = approver.is_user()
        && role
            .whitelisted_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(approver.id()));
    let is_same_level_user = approver.is_user()
        && same_level_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(approver.id()));
    let is_whitelisted_agent = approver.is_agent()
        && role
            .whitelisted_agents
            .iter()
            .any(|a| a.eq_ignore_ascii_case(approver.id()));

    match required {
        Clearance::ApprovedByWhitelistedAgent => {
            is_whitelisted_agent || is_same_level_user || is_whitelisted_user
        },
        Clearance::ApprovedBySameLevelUser => is_same_level_user || is_whitelisted_user,
        Clearance::ApprovedByWhitelistedUser => is_whitelisted_user,
        _ => false,
    }
}

/// Sub-agent creation invariant: the created role must be element-wise at
/// or below the creator on every global flag, every action type, and every
/// resource grant.
pub fn check_subagent_monotonic(
    creator: &RolePermissions,
    created: &RolePermissions,
) -> Result<()> {
    for action in ActionType::ALL {
        if let (Some(creator_flag), Some(created_flag)) =
            (creator.global_flag(*action), created.global_flag(*action))
            && created_flag
            && !creator_flag
        {
            return Err(Error::denied(format!(
                "sub-agent gains {action:?} its creator lacks"
            )));
        }
    }

    if creator.lift(Clearance::Unset) < created.lift(Clearance::Unset) {
        return Err(Error::denied(
            "sub-agent default clearance exceeds its creator's",
        ));
    }

    for (kind, grants) in &created.grants {
        for grant in grants {
            let created_level = created.lift(grant.clearance);
            if created_level <= Clearance::Denied {
                continue;
            }
            let Some(creator_grant) = creator.find_grant(*kind, &grant.resource_id) else {
                return Err(Error::denied(format!(
                    "sub-agent granted {kind:?}/{} its creator has no grant for",
                    grant.resource_id
                )));
            };
            let creator_level = creator.lift(creator_grant.clearance);
            if created_level > creator_level {
                return Err(Error::denied(format!(
                    "sub-agent clearance {created_level:?} on {kind:?}/{} exceeds creator's {creator_level:?}",
                    grant.resource_id
                )));
            }
        }
    }
    Ok(())
}
