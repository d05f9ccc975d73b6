//! Command dispatch threads.
//!
//! One dispatch thread owns the `Debouncer` and is the only writer of the
//! per-actuator state. Each configured actuator gets a worker thread that owns
//! its driver, so a slow bus transaction on one device never holds up another.
//!
//! ```text
//! submit_command ──cmd──▶ dispatch ──job──▶ worker(pump) ──ack──┐
//!                            ▲        └───▶ worker(lighting) ───┤
//!                            └──────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use reef_traits::{AutoFeederDriver, DriverResult, LightingDriver, PumpDriver, WaveMakerDriver};

use crate::config::DebounceCfg;
use crate::debouncer::Debouncer;
use crate::error::{BuildError, CoreError};
use crate::faults::FaultMonitor;
use crate::hw_error::map_hw_error;
use crate::state::{FeedGate, StateTable};
use crate::types::{Actuator, FaultKind, Setpoint, ValidCommand};
use crate::util::{SharedClock, millis};

/// Upper bound on how long the dispatch loop sleeps with nothing scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// A driver reduced to "apply this setpoint".
pub(crate) type Actuate = Box<dyn FnMut(Setpoint) -> DriverResult<()> + Send>;

fn mismatch(target: Actuator, sp: Setpoint) -> Box<dyn std::error::Error + Send + Sync> {
    format!("{target} cannot apply {sp}").into()
}

pub(crate) fn pump<D: PumpDriver + Send + 'static>(mut driver: D) -> Actuate {
    Box::new(move |sp| match sp {
        Setpoint::Percent(p) => driver.set_speed(p),
        other => Err(mismatch(Actuator::Pump, other)),
    })
}

pub(crate) fn wavemaker<D: WaveMakerDriver + Send + 'static>(mut driver: D) -> Actuate {
    Box::new(move |sp| match sp {
        Setpoint::Switch(on) => driver.set_enabled(on),
        other => Err(mismatch(Actuator::WaveMaker, other)),
    })
}

pub(crate) fn feeder<D: AutoFeederDriver + Send + 'static>(mut driver: D) -> Actuate {
    Box::new(move |sp| match sp {
        Setpoint::Trigger => driver.dispense(),
        other => Err(mismatch(Actuator::Feeder, other)),
    })
}

pub(crate) fn lighting<D: LightingDriver + Send + 'static>(mut driver: D) -> Actuate {
    Box::new(move |sp| match sp {
        Setpoint::Percent(p) => driver.set_intensity(p),
        other => Err(mismatch(Actuator::Lighting, other)),
    })
}

#[derive(Debug)]
struct Ack {
    target: Actuator,
    setpoint: Setpoint,
    result: Result<(), CoreError>,
    started: Instant,
    elapsed: Duration,
}

/// Shared state the dispatch thread writes and `ReefCore` reads.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) states: Arc<StateTable>,
    pub(crate) faults: Arc<FaultMonitor>,
    pub(crate) feed_gate: Arc<FeedGate>,
    /// Commands the dispatch thread has taken off the channel.
    pub(crate) processed: Arc<AtomicU64>,
    pub(crate) clock: SharedClock,
}

/// Owns the dispatch thread. Dropping the command sender ends it; `join`
/// then waits for in-flight driver calls to return.
pub(crate) struct DispatcherHandle {
    join: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("dispatch thread joined"),
                Err(e) => tracing::warn!(?e, "dispatch thread panicked"),
            }
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.join();
    }
}

pub(crate) fn spawn(
    actuators: Vec<(Actuator, Actuate)>,
    cmd_rx: xch::Receiver<ValidCommand>,
    cfg: &DebounceCfg,
    shared: Shared,
) -> Result<DispatcherHandle, BuildError> {
    let (ack_tx, ack_rx) = xch::unbounded::<Ack>();
    let mut jobs: [Option<xch::Sender<Setpoint>>; 4] = Default::default();
    let mut workers = Vec::with_capacity(actuators.len());

    for (target, actuate) in actuators {
        let (job_tx, job_rx) = xch::bounded::<Setpoint>(1);
        let ack_tx = ack_tx.clone();
        let clock = Arc::clone(&shared.clock);
        let handle = thread::Builder::new()
            .name(format!("reef-{target}"))
            .spawn(move || run_worker(target, actuate, &job_rx, &ack_tx, &clock))
            .map_err(|_| BuildError::Spawn("actuator worker"))?;
        jobs[target.index()] = Some(job_tx);
        workers.push(handle);
    }

    let dispatch = Dispatch {
        debouncer: Debouncer::new(cfg.interval, cfg.actuation_timeout),
        jobs,
        shared,
        closing: false,
    };
    let join = thread::Builder::new()
        .name("reef-dispatch".into())
        .spawn(move || {
            // Held so the ack channel never reports disconnection while the
            // loop runs, even with no workers.
            let _keepalive = ack_tx;
            dispatch.run(&cmd_rx, &ack_rx, workers);
        })
        .map_err(|_| BuildError::Spawn("dispatch"))?;

    Ok(DispatcherHandle { join: Some(join) })
}

fn run_worker(
    target: Actuator,
    mut actuate: Actuate,
    jobs: &xch::Receiver<Setpoint>,
    acks: &xch::Sender<Ack>,
    clock: &SharedClock,
) {
    for setpoint in jobs.iter() {
        let started = clock.now();
        let result = actuate(setpoint).map_err(|e| map_hw_error(&*e));
        let elapsed = clock.now().saturating_duration_since(started);
        let ack = Ack {
            target,
            setpoint,
            result,
            started,
            elapsed,
        };
        if acks.send(ack).is_err() {
            break;
        }
    }
    tracing::trace!(%target, "worker exiting");
}

struct Dispatch {
    debouncer: Debouncer,
    jobs: [Option<xch::Sender<Setpoint>>; 4],
    shared: Shared,
    closing: bool,
}

impl Dispatch {
    fn run(
        mut self,
        cmd_rx: &xch::Receiver<ValidCommand>,
        ack_rx: &xch::Receiver<Ack>,
        workers: Vec<JoinHandle<()>>,
    ) {
        let mut open = true;
        while open {
            let now = self.shared.clock.now();
            self.tick(now);
            let wait = self
                .debouncer
                .next_deadline()
                .map_or(IDLE_WAIT, |d| d.saturating_duration_since(now).min(IDLE_WAIT));
            xch::select! {
                recv(cmd_rx) -> msg => match msg {
                    Ok(cmd) => self.on_command(cmd),
                    Err(_) => open = false,
                },
                recv(ack_rx) -> msg => {
                    if let Ok(ack) = msg {
                        self.on_ack(ack);
                    }
                },
                default(wait) => {},
            }
        }

        let dropped = Actuator::ALL
            .iter()
            .filter(|a| self.debouncer.pending(**a).is_some())
            .count();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding pending commands on shutdown");
        }
        // Closing the job channels lets each worker finish its current call.
        self.closing = true;
        self.jobs = Default::default();
        for handle in workers {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "actuator worker panicked");
            }
        }
        while let Ok(ack) = ack_rx.try_recv() {
            self.on_ack(ack);
        }
        tracing::debug!("dispatch thread exiting");
    }

    fn tick(&mut self, now: Instant) {
        for (target, setpoint) in self.debouncer.take_due(now) {
            self.start(target, setpoint, now);
        }
        for target in self.debouncer.overdue(now) {
            tracing::warn!(%target, "driver call exceeded actuation timeout");
            self.shared
                .faults
                .report(target.into(), FaultKind::Timeout, now);
        }
    }

    fn on_command(&mut self, cmd: ValidCommand) {
        let now = self.shared.clock.now();
        let (target, setpoint) = (cmd.target(), cmd.setpoint());
        let replaced = self.debouncer.offer(target, setpoint, now);
        tracing::trace!(%target, %setpoint, replaced, "command accepted");
        self.shared.states.update(target, |s| {
            s.commanded = Some(setpoint);
            s.pending = true;
        });
        self.shared.processed.fetch_add(1, Ordering::AcqRel);
    }

    /// Hand a value the debouncer marked in flight to its worker.
    fn start(&mut self, target: Actuator, setpoint: Setpoint, now: Instant) {
        let pending = self.debouncer.pending(target).is_some();
        self.shared.states.update(target, |s| {
            s.in_flight = true;
            s.pending = pending;
            s.dispatches += 1;
        });
        tracing::debug!(%target, %setpoint, "dispatching");
        let sent = self.jobs[target.index()]
            .as_ref()
            .is_some_and(|tx| tx.send(setpoint).is_ok());
        if !sent {
            tracing::error!(%target, "actuator worker unavailable");
            self.finish(target, setpoint, Err(CoreError::State("worker gone".into())), now);
        }
    }

    fn on_ack(&mut self, ack: Ack) {
        tracing::trace!(
            target = %ack.target,
            elapsed_ms = millis(ack.elapsed),
            "driver returned"
        );
        self.finish(ack.target, ack.setpoint, ack.result, ack.started);
    }

    fn finish(
        &mut self,
        target: Actuator,
        setpoint: Setpoint,
        result: Result<(), CoreError>,
        started: Instant,
    ) {
        let now = self.shared.clock.now();
        let ok = result.is_ok();
        match result {
            Ok(()) => {
                self.shared.states.update(target, |s| s.confirmed = Some(setpoint));
                self.shared.faults.clear_device(target.into());
                tracing::debug!(%target, %setpoint, "confirmed");
            }
            Err(e) => {
                tracing::warn!(%target, %setpoint, error = %e, "driver call failed");
                self.shared
                    .faults
                    .report(target.into(), e.fault_kind(), now);
            }
        }
        if target == Actuator::Feeder {
            self.shared.feed_gate.release(ok.then_some(started));
        }

        let next = self.debouncer.complete(target, now);
        self.shared.states.update(target, |s| s.in_flight = false);
        if let Some(sp) = next
            && !self.closing
        {
            self.start(target, sp, now);
        } else {
            let pending = self.debouncer.pending(target).is_some();
            self.shared.states.update(target, |s| s.pending = pending);
        }
    }
}
