//! Serializable views of wizard state.
//!
//! Snapshots are immutable copies taken after an operation. They carry no
//! step content and are meant for renderers, logs and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::step::{StepId, StepState, StepStatus};

/// One step as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: StepId,
    pub label: String,
    pub help_text: Option<String>,
    pub status: StepStatus,
    pub is_first: bool,
    pub is_last: bool,
    pub is_skippable: bool,
    pub hide_finish_button: bool,
    pub hide_footer: bool,
}

impl From<&StepState> for StepSnapshot {
    fn from(state: &StepState) -> Self {
        Self {
            id: state.id().clone(),
            label: state.descriptor.label.clone(),
            help_text: state.descriptor.help_text.clone(),
            status: state.status(),
            is_first: state.is_first,
            is_last: state.is_last,
            is_skippable: state.descriptor.is_skippable,
            hide_finish_button: state.descriptor.hide_finish_button,
            hide_footer: state.descriptor.hide_footer,
        }
    }
}

/// The whole wizard at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardSnapshot {
    pub session_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub steps: Vec<StepSnapshot>,
    pub active: Option<StepId>,
    /// Step whose forward move waits on a commit
    pub pending: Option<StepId>,
    pub loading: bool,
    pub closed: bool,
}

impl WizardSnapshot {
    pub fn step(&self, id: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
