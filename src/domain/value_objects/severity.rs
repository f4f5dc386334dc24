use serde::{Deserialize, Serialize};

/// How bad a detected problem is. Informational only; any denial blocks the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single security check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied { reason: String, severity: Severity },
}

impl Verdict {
    pub fn deny(reason: impl Into<String>, severity: Severity) -> Self {
        Self::Denied { reason: reason.into(), severity }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::Allowed => None,
            Self::Denied { severity, .. } => Some(*severity),
        }
    }
}
