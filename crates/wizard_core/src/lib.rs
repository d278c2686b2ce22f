//! # wizard_core
//!
//! Step wizard engine.
//!
//! This crate provides the state machine that drives a user through an
//! ordered list of configuration steps whose composition is re-derived from
//! host context, and where a step may need to commit its own data before the
//! wizard is allowed to move on.
//!
//! # Architecture
//!
//! - **Steps**: Host-supplied descriptors plus engine-owned progress state
//! - **Reconciler**: Merges a freshly derived step list into existing progress by id
//! - **Navigation**: Read-only neighbor and terminal queries
//! - **Controller**: The synchronous state machine (next / previous / finish)
//! - **Commits**: One-shot handles that let step content release a parked move
//! - **Session**: Async wrapper that awaits commits on the caller's behalf
//!
//! # Example
//!
//! ```rust,ignore
//! use wizard_core::{
//!     AdvanceOptions, StepDescriptor, WizardConfig, WizardController, WizardSession,
//! };
//!
//! let controller = WizardController::with_steps(
//!     WizardConfig::default(),
//!     vec![
//!         StepDescriptor::new("source", "Source"),
//!         StepDescriptor::new("schema", "Schema").with_content(schema_form),
//!         StepDescriptor::new("review", "Review"),
//!     ],
//! )?;
//!
//! let session = WizardSession::new(controller);
//! // Waits for the schema form to commit before moving on
//! let transition = session.next(AdvanceOptions::new()).await?;
//! ```

pub mod commit;
pub mod config;
pub mod controller;
pub mod error;
pub mod navigation;
pub mod provider;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod step;

// Re-export main types for convenience
pub use commit::{CommitHandle, CommitOutcome, CommitToken, PendingTransition, TransitionKind};
pub use config::{PendingPolicy, WizardConfig};
pub use controller::{
    AdvanceOptions, Completion, FinishOptions, StepChange, Transition, WizardController,
    WizardHost,
};
pub use error::{CoreError, CoreResult};
pub use provider::StepProvider;
pub use reconcile::reconcile;
pub use session::WizardSession;
pub use snapshot::{StepSnapshot, WizardSnapshot};
pub use step::{StepContent, StepDescriptor, StepId, StepState, StepStatus};
