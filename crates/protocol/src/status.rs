use serde::{Deserialize, Serialize};

/// Boundary outcome classes and their HTTP status codes. The transports
/// map handler results through this; nothing here depends on an HTTP
/// library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundaryStatus {
    /// Success with a body.
    Ok,
    /// Success without a body.
    NoContent,
    /// Validation failure (bad script, bad arguments).
    Invalid,
    /// Authentication failure.
    Unauthenticated,
    /// Forbidden by permissions.
    Forbidden,
    /// Unknown identifier.
    NotFound,
    /// Upstream unreachable.
    UpstreamUnreachable,
}

impl BoundaryStatus {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::Invalid => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::UpstreamUnreachable => 502,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::NoContent)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(BoundaryStatus::Ok.code(), 200);
        assert_eq!(BoundaryStatus::NoContent.code(), 204);
        assert_eq!(BoundaryStatus::Invalid.code(), 400);
        assert_eq!(BoundaryStatus::Unauthenticated.code(), 401);
        assert_eq!(BoundaryStatus::Forbidden.code(), 403);
        assert_eq!(BoundaryStatus::NotFound.code(), 404);
        assert_eq!(BoundaryStatus::UpstreamUnreachable.code(), 502);
        assert!(BoundaryStatus::NoContent.is_success());
        assert!(!BoundaryStatus::Forbidden.is_success());
    }
}
