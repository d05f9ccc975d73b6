//! Sampler state machine and overall controller health.

/// Telemetry sampler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerState {
    /// Waiting for the next tick; the last read (if any) succeeded.
    #[default]
    Idle,
    /// A read is in progress.
    Sampling,
    /// The last read failed, timed out or was out of range.
    Stale,
}

/// Aggregate state derived from the active fault set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Nominal,
    Degraded { faults: usize },
}
