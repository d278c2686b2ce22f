//! Merging freshly derived descriptors into existing step state.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::step::{StepDescriptor, StepId, StepState};

/// Merge `descriptors` into `existing`, keyed by step id.
///
/// - Output order follows `descriptors`.
/// - Ids present in both keep their progress flags and take the new descriptor.
/// - New ids start inactive and not done.
/// - Ids missing from `descriptors` are dropped.
/// - `is_last` is recomputed for every step.
/// - When nothing is active afterwards, the first un-done step is activated
///   and marked first.
///
/// Fails on duplicate ids without touching anything.
pub fn reconcile(
    existing: &[StepState],
    descriptors: Vec<StepDescriptor>,
) -> CoreResult<Vec<StepState>> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in &descriptors {
        if !seen.insert(&descriptor.id) {
            return Err(CoreError::DuplicateStep(descriptor.id.to_string()));
        }
    }

    let previous: HashMap<&StepId, &StepState> =
        existing.iter().map(|state| (state.id(), state)).collect();

    for state in existing {
        if !seen.contains(state.id()) {
            debug!("Dropping step {} (no longer derived)", state.id());
        }
    }

    let mut states: Vec<StepState> = descriptors
        .into_iter()
        .map(|descriptor| match previous.get(&descriptor.id) {
            Some(prior) => StepState {
                descriptor,
                is_active: prior.is_active,
                is_done: prior.is_done,
                is_skipped: prior.is_skipped,
                is_first: prior.is_first,
                is_last: false,
            },
            None => {
                debug!("New step {}", descriptor.id);
                StepState::new(descriptor)
            }
        })
        .collect();

    refresh_last(&mut states);
    ensure_active(&mut states);

    Ok(states)
}

/// Recompute `is_last` from position and override.
pub(crate) fn refresh_last(states: &mut [StepState]) {
    let count = states.len();
    for (index, state) in states.iter_mut().enumerate() {
        state.is_last = state
            .descriptor
            .is_last_override
            .unwrap_or(index + 1 == count);
    }
}

/// Activate a step when none is active. Progress flags of the chosen step
/// are kept; only `is_active` and `is_first` change.
fn ensure_active(states: &mut [StepState]) {
    if states.is_empty() || states.iter().any(|s| s.is_active) {
        return;
    }

    let index = states.iter().position(|s| !s.is_done).unwrap_or(0);
    for (position, state) in states.iter_mut().enumerate() {
        state.is_first = position == index;
    }
    states[index].is_active = true;
    debug!("Activated step {} as first step", states[index].id());
}
