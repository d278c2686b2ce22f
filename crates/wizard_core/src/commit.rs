//! Deferred commit handles.
//!
//! A forward move from a step whose content defers its commit is parked by
//! the controller as a [`PendingTransition`]. The content receives the
//! matching [`CommitHandle`] and resolves it once its own work is done. The
//! handle is consumed on resolution, so it can fire at most once.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::step::{StepContent, StepId};

/// Identifies one parked transition within one wizard session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitToken {
    session: Uuid,
    seq: u64,
}

impl CommitToken {
    pub(crate) fn new(session: Uuid, seq: u64) -> Self {
        Self { session, seq }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for CommitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.seq)
    }
}

/// How step content resolved a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Rejected(String),
}

/// Which operation parked the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Next,
    Finish,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => write!(f, "next"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

/// One-shot continuation handed to step content.
#[derive(Debug)]
pub struct CommitHandle {
    token: CommitToken,
    step: StepId,
    sender: oneshot::Sender<CommitOutcome>,
}

impl CommitHandle {
    pub(crate) fn channel(
        token: CommitToken,
        step: StepId,
    ) -> (Self, oneshot::Receiver<CommitOutcome>) {
        let (sender, receiver) = oneshot::channel();
        (Self { token, step, sender }, receiver)
    }

    pub fn token(&self) -> CommitToken {
        self.token
    }

    pub fn step(&self) -> &StepId {
        &self.step
    }

    /// Signal that the step's own work succeeded.
    ///
    /// Returns `false` when nobody is waiting any more.
    pub fn commit(self) -> bool {
        self.resolve(CommitOutcome::Committed)
    }

    /// Signal that the step's own work failed; the wizard stays on the step.
    pub fn reject(self, reason: impl Into<String>) -> bool {
        self.resolve(CommitOutcome::Rejected(reason.into()))
    }

    fn resolve(self, outcome: CommitOutcome) -> bool {
        match self.sender.send(outcome) {
            Ok(()) => true,
            Err(_) => {
                debug!("Commit for step {} ({}) has no listener", self.step, self.token);
                false
            }
        }
    }
}

/// A forward move parked until its step finishes committing.
///
/// Returned inside [`Transition::Deferred`](crate::controller::Transition::Deferred).
/// Resolve it with [`settle`](Self::settle), then hand the token back to the
/// controller's `complete` or `abandon`.
pub struct PendingTransition {
    token: CommitToken,
    step: StepId,
    kind: TransitionKind,
    commit: Option<oneshot::Receiver<CommitOutcome>>,
    before_advance: Option<Arc<dyn StepContent>>,
}

impl PendingTransition {
    pub(crate) fn new(
        token: CommitToken,
        step: StepId,
        kind: TransitionKind,
        commit: Option<oneshot::Receiver<CommitOutcome>>,
        before_advance: Option<Arc<dyn StepContent>>,
    ) -> Self {
        Self {
            token,
            step,
            kind,
            commit,
            before_advance,
        }
    }

    pub fn token(&self) -> CommitToken {
        self.token
    }

    pub fn step(&self) -> &StepId {
        &self.step
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Whether the step content still has to resolve a commit handle.
    pub fn awaits_commit(&self) -> bool {
        self.commit.is_some()
    }

    pub fn runs_before_advance(&self) -> bool {
        self.before_advance.is_some()
    }

    /// Wait for the step content's commit, then run its pre-advance action.
    ///
    /// A dropped handle counts as a rejection. Calling this twice does not
    /// wait twice.
    pub async fn settle(&mut self) -> CoreResult<()> {
        if let Some(receiver) = self.commit.take() {
            match receiver.await {
                Ok(CommitOutcome::Committed) => {
                    debug!("Step {} committed ({})", self.step, self.token);
                }
                Ok(CommitOutcome::Rejected(reason)) => {
                    return Err(CoreError::ActionFailed {
                        step: self.step.to_string(),
                        message: reason,
                    });
                }
                Err(_) => {
                    return Err(CoreError::ActionFailed {
                        step: self.step.to_string(),
                        message: "commit handle dropped".to_string(),
                    });
                }
            }
        }

        if let Some(content) = self.before_advance.take() {
            debug!("Running pre-advance action for step {}", self.step);
            content.before_advance().await?;
        }

        Ok(())
    }
}

impl fmt::Debug for PendingTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTransition")
            .field("token", &self.token)
            .field("step", &self.step)
            .field("kind", &self.kind)
            .field("awaits_commit", &self.commit.is_some())
            .field("runs_before_advance", &self.before_advance.is_some())
            .finish()
    }
}
