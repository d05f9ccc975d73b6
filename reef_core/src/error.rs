use thiserror::Error;

use crate::types::{Actuator, CommandValue, FaultKind};

/// Errors returned synchronously from `ReefCore::submit_command`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{target} value {value} out of range (expected 0..=100)")]
    OutOfRange { target: Actuator, value: i32 },
    #[error("{target} does not accept {value:?}")]
    InvalidCommand {
        target: Actuator,
        value: CommandValue,
    },
    #[error("{0} is busy")]
    Busy(Actuator),
    #[error("{0} is not configured")]
    NotConfigured(Actuator),
    #[error("controller is shut down")]
    Closed,
}

/// Driver-side failures, captured by the fault monitor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("timeout waiting for driver")]
    Timeout,
    #[error("value out of range: {0}")]
    OutOfRange(String),
    #[error("driver busy")]
    Busy,
    #[error("driver error: {0}")]
    Driver(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

impl CoreError {
    /// Fault category recorded for this error.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            CoreError::Timeout => FaultKind::Timeout,
            CoreError::OutOfRange(_) => FaultKind::OutOfRange,
            CoreError::Busy
            | CoreError::Driver(_)
            | CoreError::Config(_)
            | CoreError::State(_) => FaultKind::DriverError,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing power monitor")]
    MissingPowerMonitor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
