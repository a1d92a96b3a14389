use serde::{Deserialize, Serialize};

/// What an agent may do on its own, and whose approval suffices when it
/// may not.
///
/// Totally ordered, lowest to highest. A grant carrying a clearance does
/// not itself approve anything — it declares the ceiling at which the
/// action may proceed and which approvers can lift it there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Clearance {
    #[default]
    Unset,
    Denied,
    Independent,
    ApprovedByWhitelistedAgent,
    ApprovedBySameLevelUser,
    ApprovedByWhitelistedUser,
    AlwaysApproved,
}

impl Clearance {
    /// Whether this clearance lets the action run without a human in the
    /// loop.
    #[must_use]
    pub fn executes_unattended(&self) -> bool {
        matches!(self, Self::Independent | Self::AlwaysApproved)
    }

    /// Whether this clearance can be satisfied by some approver.
    #[must_use]
    pub fn needs_approval(&self) -> bool {
        matches!(
            self,
            Self::ApprovedByWhitelistedAgent
                | Self::ApprovedBySameLevelUser
                | Self::ApprovedByWhitelistedUser
        )
    }

    /// The lesser of two clearances; `Unset` is treated as absent, not as
    /// the minimum.
    #[must_use]
    pub fn intersect(self, other: Clearance) -> Clearance {
        match (self, other) {
            (Self::Unset, c) | (c, Self::Unset) => c,
            (a, b) => a.min(b),
        }
    }
}
