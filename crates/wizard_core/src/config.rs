//! Wizard configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What `previous()` does while a forward move is waiting on a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Refuse the move; the caller sees `Transition::Busy`.
    #[default]
    Reject,
    /// Drop the pending commit and move back. A late resolution is ignored.
    Cancel,
}

impl PendingPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for PendingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Controller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Behaviour of `previous()` while a commit is outstanding
    pub pending_previous: PendingPolicy,
    /// Treat the loading flag as a navigation lock
    pub loading_blocks_navigation: bool,
    /// Give up on a commit after this many milliseconds (None = wait forever)
    pub commit_timeout_ms: Option<u64>,
}

impl WizardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_previous(mut self, policy: PendingPolicy) -> Self {
        self.pending_previous = policy;
        self
    }

    pub fn loading_blocks_navigation(mut self, blocks: bool) -> Self {
        self.loading_blocks_navigation = blocks;
        self
    }

    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Commit timeout as a duration, if one is set.
    pub fn commit_timeout_duration(&self) -> Option<Duration> {
        self.commit_timeout_ms.map(Duration::from_millis)
    }
}
