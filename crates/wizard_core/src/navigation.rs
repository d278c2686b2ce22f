//! Read-only navigation queries over an ordered step list.
//!
//! Neighbors are resolved by position in the list, never by id order.

use crate::step::{StepId, StepState};

/// The single active step, if any.
pub fn active_step(states: &[StepState]) -> Option<&StepState> {
    states.iter().find(|s| s.is_active)
}

pub fn active_index(states: &[StepState]) -> Option<usize> {
    states.iter().position(|s| s.is_active)
}

/// Position of the step with the given id.
pub fn position(states: &[StepState], id: &StepId) -> Option<usize> {
    states.iter().position(|s| s.id() == id)
}

/// The step after `id`, or `None` for the last step or an unknown id.
pub fn next_step<'a>(states: &'a [StepState], id: &StepId) -> Option<&'a StepState> {
    position(states, id).and_then(|index| states.get(index + 1))
}

/// The step before `id`, or `None` for the first step or an unknown id.
pub fn previous_step<'a>(states: &'a [StepState], id: &StepId) -> Option<&'a StepState> {
    match position(states, id) {
        Some(index) if index > 0 => states.get(index - 1),
        _ => None,
    }
}

/// Whether `id` is terminal: its override if set, otherwise "has no successor".
pub fn is_terminal(states: &[StepState], id: &StepId) -> bool {
    let Some(index) = position(states, id) else {
        return false;
    };
    states[index]
        .descriptor
        .is_last_override
        .unwrap_or(index + 1 == states.len())
}

/// Whether the active step has a successor and is not marked last.
pub fn can_go_next(states: &[StepState]) -> bool {
    active_index(states).is_some_and(|index| index + 1 < states.len() && !states[index].is_last)
}

/// Whether the active step has a predecessor to move back to.
pub fn can_go_back(states: &[StepState]) -> bool {
    active_index(states).is_some_and(|index| index > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::step::StepDescriptor;

    fn states() -> Vec<StepState> {
        reconcile(
            &[],
            vec![
                StepDescriptor::new("alpha", "Alpha"),
                StepDescriptor::new("beta", "Beta"),
                StepDescriptor::new("gamma", "Gamma"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_active_step() {
        let states = states();
        assert_eq!(active_step(&states).unwrap().id(), "alpha");
        assert_eq!(active_index(&states), Some(0));
        assert!(active_step(&[]).is_none());
    }

    #[test]
    fn test_neighbors() {
        let states = states();
        let beta = StepId::new("beta");

        assert_eq!(next_step(&states, &beta).unwrap().id(), "gamma");
        assert_eq!(previous_step(&states, &beta).unwrap().id(), "alpha");
        assert!(previous_step(&states, &StepId::new("alpha")).is_none());
        assert!(next_step(&states, &StepId::new("gamma")).is_none());
        assert!(next_step(&states, &StepId::new("missing")).is_none());
    }

    #[test]
    fn test_is_terminal() {
        let mut states = states();
        assert!(is_terminal(&states, &StepId::new("gamma")));
        assert!(!is_terminal(&states, &StepId::new("beta")));

        states[1].descriptor.is_last_override = Some(true);
        states[2].descriptor.is_last_override = Some(false);
        assert!(is_terminal(&states, &StepId::new("beta")));
        assert!(!is_terminal(&states, &StepId::new("gamma")));
        assert!(!is_terminal(&states, &StepId::new("missing")));
    }

    #[test]
    fn test_can_move() {
        let mut states = states();
        assert!(can_go_next(&states));
        assert!(!can_go_back(&states));

        states[0].is_active = false;
        states[2].is_active = true;
        assert!(!can_go_next(&states));
        assert!(can_go_back(&states));

        states[2].is_active = false;
        states[1].is_active = true;
        states[1].is_last = true;
        assert!(!can_go_next(&states));
    }
}
