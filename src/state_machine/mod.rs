// Step state machine for request lifecycles
//
// The step graph is pure data: `StepTable` answers whether an edge is legal and which
// status marker belongs to a step. Records consult it through `RequestRecord::try_transition`
// and fall back to `RequestRecord::force_step` when the edge is not in the table.

pub mod errors;
pub mod step_table;
pub mod steps;

pub use errors::{StateMachineError, StateMachineResult};
pub use step_table::{StepTable, DIP_STEP_TABLE, INGEST_STEP_TABLE};
pub use steps::Step;
