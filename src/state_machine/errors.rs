use super::steps::Step;

pub type StateMachineResult<T> = Result<T, StateMachineError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// The edge is not in the lifecycle's step table
    #[error("Illegal transition in {lifecycle} lifecycle: {from} -> {to}")]
    IllegalTransition {
        lifecycle: &'static str,
        from: Step,
        to: Step,
    },

    /// The step does not exist in this lifecycle at all
    #[error("Step {step} is not part of the {lifecycle} lifecycle")]
    UnknownStep { lifecycle: &'static str, step: Step },
}
