//! Step descriptor providers.
//!
//! A provider derives the current step list from host context. The engine
//! calls it only when the host asks for a refresh.

use crate::step::StepDescriptor;

/// Trait for producing the ordered step list from host context.
///
/// Closures of the form `Fn(&C) -> Vec<StepDescriptor>` implement it.
pub trait StepProvider<C>: Send + Sync {
    /// Derive the steps for `context`. Ids must be unique and stable for
    /// steps that are in progress.
    fn steps(&self, context: &C) -> Vec<StepDescriptor>;
}

impl<C, F> StepProvider<C> for F
where
    F: Fn(&C) -> Vec<StepDescriptor> + Send + Sync,
{
    fn steps(&self, context: &C) -> Vec<StepDescriptor> {
        self(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SourceSteps;

    impl StepProvider<bool> for SourceSteps {
        fn steps(&self, needs_schema: &bool) -> Vec<StepDescriptor> {
            let mut steps = vec![StepDescriptor::new("source", "Source")];
            if *needs_schema {
                steps.push(StepDescriptor::new("schema", "Schema"));
            }
            steps.push(StepDescriptor::new("review", "Review"));
            steps
        }
    }

    #[test]
    fn test_struct_provider() {
        let provider = SourceSteps;
        assert_eq!(provider.steps(&true).len(), 3);
        assert_eq!(provider.steps(&false).len(), 2);
    }

    #[test]
    fn test_closure_provider() {
        let provider = |count: &usize| {
            (0..*count)
                .map(|i| StepDescriptor::new(format!("step-{}", i), "Step"))
                .collect::<Vec<_>>()
        };

        let steps = StepProvider::steps(&provider, &2);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].id, "step-1");
    }
}
