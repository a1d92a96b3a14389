//! Permission model: clearances, role permissions, resource grants,
//! pre-approvals, and the effective-clearance resolver.

pub mod action;
pub mod clearance;
pub mod error;
pub mod grants;
pub mod preapproval;
pub mod resolver;

pub use {
    action::{ActionType, ResourceKind},
    clearance::Clearance,
    error::{Error, Result},
    grants::{ALL_RESOURCES, ResourceGrant, RolePermissions},
    preapproval::{DefaultResourceSet, PreApproval, Scope, ScopeChain},
    resolver::{ResolveRequest, Verdict, approver_eligible, check_subagent_monotonic, resolve},
};
