use serde::{Deserialize, Serialize};

/// Who initiated an action: a human user or another agent.
///
/// Jobs, approvals, and permission checks all carry one of these. The two
/// arms are deliberately not interchangeable — approval eligibility and
/// sub-agent rules treat them differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CallerIdentity {
    User { id: String },
    Agent { id: String },
}

impl CallerIdentity {
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self::User { id: id.into() }
    }

    #[must_use]
    pub fn agent(id: impl Into<String>) -> Self {
        Self::Agent { id: id.into() }
    }

    /// The bare identifier, regardless of kind.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User { id } | Self::Agent { id } => id,
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    #[must_use]
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent { .. })
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User { id } => write!(f, "user:{id}"),
            Self::Agent { id } => write!(f, "agent:{id}"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_roundtrip() {
        let id = CallerIdentity::user("u-1");
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains(r#""kind":"user""#));
        let back: CallerIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(CallerIdentity::agent("a-9").to_string(), "agent:a-9");
        assert!(CallerIdentity::agent("a-9").is_agent());
        assert!(!CallerIdentity::agent("a-9").is_user());
    }
}
