//! Per-source failure classification.

use std::fmt;

use serde::Serialize;

use super::price::SourceId;

/// Why a source did not contribute an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    NetworkError,
    InvalidResponse,
    RateLimited,
    UnsupportedPair,
}

impl FailureKind {
    /// Transient kinds are worth another attempt within the same call.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NetworkError | Self::RateLimited)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::RateLimited => "rate_limited",
            Self::UnsupportedPair => "unsupported_pair",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records why one source did not contribute. Always surfaced in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub kind: FailureKind,
    pub message: String,
}

impl SourceFailure {
    pub fn new(source: SourceId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(source: SourceId, message: impl Into<String>) -> Self {
        Self::new(source, FailureKind::Timeout, message)
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.source, self.kind, self.message)
    }
}

impl std::error::Error for SourceFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_and_rate_limit_are_transient() {
        assert!(FailureKind::NetworkError.is_transient());
        assert!(FailureKind::RateLimited.is_transient());
        assert!(!FailureKind::Timeout.is_transient());
        assert!(!FailureKind::InvalidResponse.is_transient());
        assert!(!FailureKind::UnsupportedPair.is_transient());
    }
}
