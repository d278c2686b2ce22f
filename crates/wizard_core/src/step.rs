//! Step descriptors, step state and the step content capability set.
//!
//! Steps are the building blocks of a wizard. The host describes each step
//! with an immutable [`StepDescriptor`]; the engine tracks progress for it in
//! a [`StepState`].
//!
//! # Step Lifecycle
//!
//! 1. **Derivation**: The host produces descriptors from its own context.
//! 2. **Reconciliation**: Descriptors are merged into existing state by id.
//! 3. **Activation**: The controller moves the single active flag between steps.
//! 4. **Commit**: Step content may defer a forward move until its own work is done.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use wizard_core::{CommitHandle, StepContent, StepDescriptor};
//!
//! struct ConnectorForm;
//!
//! #[async_trait]
//! impl StepContent for ConnectorForm {
//!     fn defers_commit(&self) -> bool { true }
//!
//!     fn request_commit(&self, handle: CommitHandle) {
//!         tokio::spawn(async move {
//!             // Save the form, then let the wizard move on
//!             handle.commit();
//!         });
//!     }
//! }
//!
//! let step = StepDescriptor::new("connector", "Select connector")
//!     .with_content(Arc::new(ConnectorForm));
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commit::CommitHandle;
use crate::error::CoreResult;

/// Stable identity of a step within one wizard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for StepId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Trait for the content a host renders inside a step.
///
/// The engine never inspects content beyond these hooks. Every hook has a
/// default, so content only implements the capabilities it needs.
///
/// # Forward moves
///
/// When the user moves forward from a step that has content, the controller:
///
/// 1. Calls [`validate`](Self::validate); `false` blocks the move silently.
/// 2. If [`defers_commit`](Self::defers_commit) is true, hands a
///    [`CommitHandle`] to [`request_commit`](Self::request_commit) and waits
///    until the content resolves it.
/// 3. If [`has_before_advance`](Self::has_before_advance) is true, awaits
///    [`before_advance`](Self::before_advance) before applying the move.
///
/// # Thread Safety
///
/// Content must be `Send + Sync` so commits can resolve from spawned tasks.
#[async_trait]
pub trait StepContent: Send + Sync {
    /// Synchronous gate checked before any forward move.
    fn validate(&self) -> bool {
        true
    }

    /// Whether this content performs its own commit before the wizard may advance.
    fn defers_commit(&self) -> bool {
        false
    }

    /// Ask the content to commit. The content resolves `handle` once its own
    /// (possibly asynchronous) work finishes.
    fn request_commit(&self, handle: CommitHandle) {
        handle.commit();
    }

    /// Whether [`before_advance`](Self::before_advance) should run before the move is applied.
    fn has_before_advance(&self) -> bool {
        false
    }

    /// Side effect run after the commit and before the step is left,
    /// e.g. a remote action. An error keeps the wizard on the step.
    async fn before_advance(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Immutable description of one step, supplied by the host.
#[derive(Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: StepId,
    /// Presentation label, resolved by the host
    pub label: String,
    pub help_text: Option<String>,
    pub is_skippable: bool,
    pub hide_finish_button: bool,
    pub hide_footer: bool,
    /// Host-declared terminal flag; wins over position when set
    pub is_last_override: Option<bool>,
    #[serde(skip)]
    pub content: Option<Arc<dyn StepContent>>,
}

impl StepDescriptor {
    pub fn new(id: impl Into<StepId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            help_text: None,
            is_skippable: false,
            hide_finish_button: false,
            hide_footer: false,
            is_last_override: None,
            content: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = Some(help.into());
        self
    }

    pub fn skippable(mut self) -> Self {
        self.is_skippable = true;
        self
    }

    pub fn hide_finish_button(mut self) -> Self {
        self.hide_finish_button = true;
        self
    }

    pub fn hide_footer(mut self) -> Self {
        self.hide_footer = true;
        self
    }

    pub fn last(mut self, is_last: bool) -> Self {
        self.is_last_override = Some(is_last);
        self
    }

    pub fn with_content(mut self, content: Arc<dyn StepContent>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("help_text", &self.help_text)
            .field("is_skippable", &self.is_skippable)
            .field("hide_finish_button", &self.hide_finish_button)
            .field("hide_footer", &self.hide_footer)
            .field("is_last_override", &self.is_last_override)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}

/// Progress of a step as seen by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Active,
    Done,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Done => "done",
            Self::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Engine-owned runtime record for one step.
///
/// Only the controller flips the flags; hosts read them.
#[derive(Debug, Clone)]
pub struct StepState {
    pub descriptor: StepDescriptor,
    pub is_active: bool,
    pub is_done: bool,
    pub is_skipped: bool,
    pub is_first: bool,
    pub is_last: bool,
}

impl StepState {
    /// Fresh state: not active, not done.
    pub fn new(descriptor: StepDescriptor) -> Self {
        Self {
            descriptor,
            is_active: false,
            is_done: false,
            is_skipped: false,
            is_first: false,
            is_last: false,
        }
    }

    pub fn id(&self) -> &StepId {
        &self.descriptor.id
    }

    pub fn label(&self) -> &str {
        &self.descriptor.label
    }

    pub fn content(&self) -> Option<&Arc<dyn StepContent>> {
        self.descriptor.content.as_ref()
    }

    pub fn status(&self) -> StepStatus {
        if self.is_active {
            StepStatus::Active
        } else if self.is_done {
            StepStatus::Done
        } else if self.is_skipped {
            StepStatus::Skipped
        } else {
            StepStatus::NotStarted
        }
    }

    pub(crate) fn activate(&mut self) {
        self.is_active = true;
        self.is_done = false;
        self.is_skipped = false;
    }

    pub(crate) fn leave(&mut self, skipped: bool) {
        self.is_active = false;
        self.is_done = !skipped;
        self.is_skipped = skipped;
    }
}
