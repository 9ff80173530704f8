use std::fmt;

use crate::config::ConfigurationError;
use crate::gateways::GatewayError;
use crate::orchestration::submitter::SubmissionError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    StoreError(String),
    StateTransitionError(String),
    GatewayError(String),
    ValidationError(String),
    ConfigurationError(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::StoreError(msg) => write!(f, "Store error: {msg}"),
            RelayError::StateTransitionError(msg) => write!(f, "State transition error: {msg}"),
            RelayError::GatewayError(msg) => write!(f, "Gateway error: {msg}"),
            RelayError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            RelayError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<StoreError> for RelayError {
    fn from(error: StoreError) -> Self {
        RelayError::StoreError(error.to_string())
    }
}

impl From<StateMachineError> for RelayError {
    fn from(error: StateMachineError) -> Self {
        RelayError::StateTransitionError(error.to_string())
    }
}

impl From<GatewayError> for RelayError {
    fn from(error: GatewayError) -> Self {
        RelayError::GatewayError(error.to_string())
    }
}

impl From<ConfigurationError> for RelayError {
    fn from(error: ConfigurationError) -> Self {
        RelayError::ConfigurationError(error.to_string())
    }
}

impl From<SubmissionError> for RelayError {
    fn from(error: SubmissionError) -> Self {
        match error {
            SubmissionError::Validation(msg) => RelayError::ValidationError(msg),
            SubmissionError::Store(store) => store.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
