//! # Step Tables
//!
//! Pure-data description of each lifecycle: which steps exist, the numeric status
//! marker persisted for each of them, and the legal step-to-step edges.
//!
//! Both lifecycles share the same shape. The ingest lifecycle has a separate
//! accepted-notice step between submission and polling; the DIP lifecycle goes
//! straight from submission to polling and may end right after polling when the
//! remote job produced nothing to forward.

use super::errors::{StateMachineError, StateMachineResult};
use super::steps::Step;

/// Transition table and status markers for one lifecycle
#[derive(Debug)]
pub struct StepTable {
    lifecycle: &'static str,
    markers: &'static [(Step, i32)],
    edges: &'static [(Step, &'static [Step])],
}

/// Ingest lifecycle: submit a package, notify acceptance, optionally wait for the reply report
pub static INGEST_STEP_TABLE: StepTable = StepTable {
    lifecycle: "ingest",
    markers: &[
        (Step::Startup, -1),
        (Step::SubmitRetry, -2),
        (Step::AcceptedIdRetry, -3),
        (Step::PollRetry, -4),
        (Step::ForwardRetry, -5),
        (Step::Error, -7),
        (Step::End, -10),
    ],
    edges: &[
        (Step::Startup, &[Step::SubmitRetry, Step::Error]),
        (Step::SubmitRetry, &[Step::AcceptedIdRetry, Step::Error]),
        (
            Step::AcceptedIdRetry,
            &[Step::PollRetry, Step::Error, Step::End],
        ),
        (Step::PollRetry, &[Step::ForwardRetry, Step::Error]),
        (Step::ForwardRetry, &[Step::Error, Step::End]),
        (Step::Error, &[Step::Error, Step::End]),
        (Step::End, &[Step::End]),
    ],
};

/// DIP lifecycle: submit an export query, wait for the package, forward it
pub static DIP_STEP_TABLE: StepTable = StepTable {
    lifecycle: "dip",
    markers: &[
        (Step::Startup, -1),
        (Step::SubmitRetry, -2),
        (Step::PollRetry, -3),
        (Step::ForwardRetry, -4),
        (Step::Error, -7),
        (Step::End, -10),
    ],
    edges: &[
        (Step::Startup, &[Step::SubmitRetry, Step::Error]),
        (Step::SubmitRetry, &[Step::PollRetry, Step::Error]),
        (Step::PollRetry, &[Step::ForwardRetry, Step::Error, Step::End]),
        (Step::ForwardRetry, &[Step::Error, Step::End]),
        (Step::Error, &[Step::Error, Step::End]),
        (Step::End, &[Step::End]),
    ],
};

impl StepTable {
    pub fn lifecycle(&self) -> &'static str {
        self.lifecycle
    }

    pub fn contains(&self, step: Step) -> bool {
        self.markers.iter().any(|(s, _)| *s == step)
    }

    /// Status marker persisted while a record sits on `step`
    pub fn marker(&self, step: Step) -> StateMachineResult<i32> {
        self.markers
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, marker)| *marker)
            .ok_or(StateMachineError::UnknownStep {
                lifecycle: self.lifecycle,
                step,
            })
    }

    /// Decode a persisted status back into a step.
    ///
    /// Known markers decode to their step. Anything else, including every
    /// non-negative remote status code, means the record is on the error step.
    pub fn step_for_status(&self, status: i32) -> Step {
        self.markers
            .iter()
            .find(|(_, marker)| *marker == status)
            .map(|(step, _)| *step)
            .unwrap_or(Step::Error)
    }

    /// Legal successors of `from`; empty when `from` is not part of this lifecycle
    pub fn successors(&self, from: Step) -> &'static [Step] {
        self.edges
            .iter()
            .find(|(s, _)| *s == from)
            .map(|(_, next)| *next)
            .unwrap_or(&[])
    }

    pub fn is_legal(&self, from: Step, to: Step) -> bool {
        self.successors(from).contains(&to)
    }

    /// Check an edge, reporting why it is not allowed
    pub fn check(&self, from: Step, to: Step) -> StateMachineResult<()> {
        if !self.contains(to) {
            return Err(StateMachineError::UnknownStep {
                lifecycle: self.lifecycle,
                step: to,
            });
        }
        if self.is_legal(from, to) {
            Ok(())
        } else {
            Err(StateMachineError::IllegalTransition {
                lifecycle: self.lifecycle,
                from,
                to,
            })
        }
    }

    /// Step a record moves to when the remote accepted its job
    pub fn after_submit(&self) -> Step {
        if self.contains(Step::AcceptedIdRetry) {
            Step::AcceptedIdRetry
        } else {
            Step::PollRetry
        }
    }
}
