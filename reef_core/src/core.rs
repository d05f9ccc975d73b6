//! `ReefCore`: the handle UI layers hold.
//!
//! Submission is synchronous and cheap: validate, check the feeder gate, hand
//! the command to the dispatch thread. Everything that touches hardware
//! happens on the core's own threads. Reads (`device_state`, `telemetry`,
//! `faults`, `health`) return snapshots and never block on a driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;

use crate::builder::{Missing, ReefCoreBuilder};
use crate::dispatch::{DispatcherHandle, Shared};
use crate::error::CommandError;
use crate::sampler::{SamplerHandle, TelemetryFeed};
use crate::status::Health;
use crate::types::{Actuator, DeviceCommand, DeviceState, FaultRecord, TelemetrySnapshot, ValidCommand};
use crate::validator::{ValidationPolicy, validate};

const IDLE_POLL: Duration = Duration::from_millis(5);

pub struct ReefCore {
    cmd_tx: Option<xch::Sender<ValidCommand>>,
    shared: Shared,
    telemetry: TelemetryFeed,
    policy: ValidationPolicy,
    submitted: AtomicU64,
    dispatcher: DispatcherHandle,
    sampler: SamplerHandle,
}

impl std::fmt::Debug for ReefCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReefCore")
            .field("policy", &self.policy)
            .field("running", &self.cmd_tx.is_some())
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}

impl ReefCore {
    /// Start building a controller.
    pub fn builder() -> ReefCoreBuilder<Missing> {
        ReefCoreBuilder::default()
    }

    pub(crate) fn new(
        cmd_tx: xch::Sender<ValidCommand>,
        shared: Shared,
        telemetry: TelemetryFeed,
        policy: ValidationPolicy,
        dispatcher: DispatcherHandle,
        sampler: SamplerHandle,
    ) -> Self {
        Self {
            cmd_tx: Some(cmd_tx),
            shared,
            telemetry,
            policy,
            submitted: AtomicU64::new(0),
            dispatcher,
            sampler,
        }
    }

    /// Validate and enqueue a command.
    ///
    /// Returns once the command is accepted; the driver call happens later on
    /// the dispatch thread. Rejected commands never reach a driver.
    pub fn submit_command(&self, cmd: DeviceCommand) -> Result<(), CommandError> {
        let valid = validate(cmd, self.policy).inspect_err(|e| {
            tracing::debug!(error = %e, "command rejected");
        })?;
        let target = valid.target();
        if !self.shared.states.contains(target) {
            return Err(CommandError::NotConfigured(target));
        }
        let tx = self.cmd_tx.as_ref().ok_or(CommandError::Closed)?;
        let feeding = target == Actuator::Feeder;
        if feeding && !self.shared.feed_gate.try_arm(self.shared.clock.now()) {
            tracing::debug!("feed refused, feeder busy");
            return Err(CommandError::Busy(target));
        }
        self.submitted.fetch_add(1, Ordering::AcqRel);
        tx.send(valid).map_err(|_| {
            self.submitted.fetch_sub(1, Ordering::AcqRel);
            if feeding {
                self.shared.feed_gate.release(None);
            }
            CommandError::Closed
        })
    }

    /// Commanded/confirmed view of one actuator; None if it is not attached.
    pub fn device_state(&self, target: Actuator) -> Option<DeviceState> {
        let mut state = self.shared.states.snapshot(target)?;
        state.fault = self.shared.faults.is_faulted(target.into());
        Some(state)
    }

    /// Actuators attached at build time, in `Actuator::ALL` order.
    pub fn actuators(&self) -> Vec<Actuator> {
        Actuator::ALL
            .into_iter()
            .filter(|a| self.shared.states.contains(*a))
            .collect()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Completed power monitor polls since start.
    pub fn telemetry_polls(&self) -> u64 {
        self.telemetry.polls()
    }

    pub fn faults(&self) -> Vec<FaultRecord> {
        self.shared.faults.active()
    }

    pub fn health(&self) -> Health {
        self.shared.faults.health()
    }

    /// Block (in wall-clock time) until every accepted command has reached
    /// its driver and returned. False on timeout.
    ///
    /// With a manually driven clock, debounce windows only close when the
    /// clock is advanced.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = crate::util::later(Instant::now(), timeout);
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    fn is_idle(&self) -> bool {
        self.submitted.load(Ordering::Acquire) == self.shared.processed.load(Ordering::Acquire)
            && self.shared.states.all_settled()
    }

    /// Stop accepting commands, let in-flight driver calls finish, and join
    /// every thread. Values still inside a debounce window are dropped.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.cmd_tx.take().is_none() {
            return;
        }
        self.dispatcher.join();
        self.sampler.stop();
        tracing::info!("reef core stopped");
    }
}

impl Drop for ReefCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
