use serde::{Deserialize, Serialize};

/// Everything an agent can attempt. Closed set; the resolver classifies
/// each as global (a boolean flag on the role) or per-resource (a grant
/// collection keyed by [`ResourceKind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    // Global actions
    CreateSubAgent,
    CreateContainer,
    RegisterInfoStore,
    AccessLocalhostInBrowser,
    AccessLocalhostInCli,
    // Per-resource actions
    ExecuteDangerousShell,
    ExecuteSafeShell,
    UseContainer,
    AccessWebsite,
    UseSearchEngine,
    QueryLocalInfoStore,
    QueryExternalInfoStore,
    TranscribeFromAudioDevice,
    MessageAgent,
    RunTask,
    UseSkill,
}

/// One variant per per-resource grant collection on a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    DangerousShell,
    SafeShell,
    Container,
    Website,
    SearchEngine,
    LocalInfoStore,
    ExternalInfoStore,
    AudioDevice,
    Agent,
    Task,
    Skill,
}

impl ActionType {
    /// Per-resource actions map to a grant collection; global actions map
    /// to a boolean role flag.
    #[must_use]
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match self {
            Self::CreateSubAgent
            | Self::CreateContainer
            | Self::RegisterInfoStore
            | Self::AccessLocalhostInBrowser
            | Self::AccessLocalhostInCli => None,
            Self::ExecuteDangerousShell => Some(ResourceKind::DangerousShell),
            Self::ExecuteSafeShell => Some(ResourceKind::SafeShell),
            Self::UseContainer => Some(ResourceKind::Container),
            Self::AccessWebsite => Some(ResourceKind::Website),
            Self::UseSearchEngine => Some(ResourceKind::SearchEngine),
            Self::QueryLocalInfoStore => Some(ResourceKind::LocalInfoStore),
            Self::QueryExternalInfoStore => Some(ResourceKind::ExternalInfoStore),
            Self::TranscribeFromAudioDevice => Some(ResourceKind::AudioDevice),
            Self::MessageAgent => Some(ResourceKind::Agent),
            Self::RunTask => Some(ResourceKind::Task),
            Self::UseSkill => Some(ResourceKind::Skill),
        }
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.resource_kind().is_none()
    }

    /// Every action type, for element-wise permission comparisons.
    pub const ALL: &'static [ActionType] = &[
        Self::CreateSubAgent,
        Self::CreateContainer,
        Self::RegisterInfoStore,
        Self::AccessLocalhostInBrowser,
        Self::AccessLocalhostInCli,
        Self::ExecuteDangerousShell,
        Self::ExecuteSafeShell,
        Self::UseContainer,
        Self::AccessWebsite,
        Self::UseSearchEngine,
        Self::QueryLocalInfoStore,
        Self::QueryExternalInfoStore,
        Self::TranscribeFromAudioDevice,
        Self::MessageAgent,
        Self::RunTask,
        Self::UseSkill,
    ];
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ActionType::CreateSubAgent.is_global());
        assert!(ActionType::AccessLocalhostInCli.is_global());
        assert!(!ActionType::ExecuteSafeShell.is_global());
        assert_eq!(
            ActionType::ExecuteDangerousShell.resource_kind(),
            Some(ResourceKind::DangerousShell)
        );
        assert_eq!(
            ActionType::TranscribeFromAudioDevice.resource_kind(),
            Some(ResourceKind::AudioDevice)
        );
    }

    #[test]
    fn test_all_covers_every_variant() {
        // Sixteen action types, five of them global.
        assert_eq!(ActionType::ALL.len(), 16);
        assert_eq!(ActionType::ALL.iter().filter(|a| a.is_global()).count(), 5);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&ActionType::ExecuteSafeShell).unwrap(),
            r#""executeSafeShell""#
        );
    }
}
