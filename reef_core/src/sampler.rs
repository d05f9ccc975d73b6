//! Background power monitor sampling.
//!
//! A `TelemetrySampler` owns the power monitor driver and polls it on a fixed
//! period. Each poll walks Idle → Sampling → Idle on a valid reading, or
//! → Stale on a failed, late or implausible one. Readers get the last valid
//! sample through a `TelemetryFeed`; they never touch the driver.
//!
//! Safety: `spawn` starts a tick thread and a reader thread that owns the
//! driver. A read still running after the read timeout marks telemetry stale
//! without waiting for it. Both threads are stopped and joined when the
//! returned `SamplerHandle` is dropped; a read in progress is allowed to
//! finish first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use reef_traits::{DriverResult, PowerMonitorDriver, PowerReadings};

use crate::config::TelemetryCfg;
use crate::error::{BuildError, CoreError};
use crate::faults::FaultMonitor;
use crate::hw_error::map_hw_error;
use crate::status::SamplerState;
use crate::types::{Device, FaultKind, TelemetrySample, TelemetrySnapshot};
use crate::util::{SharedClock, lock, millis};

#[derive(Debug, Default)]
struct Latest {
    sample: Option<TelemetrySample>,
    state: SamplerState,
    /// First failed poll of the current failure streak.
    stale_since: Option<Instant>,
}

#[derive(Debug, Default)]
struct Shared {
    latest: Mutex<Latest>,
    polls: AtomicU64,
}

/// Why a poll did not produce a sample.
#[derive(Debug, Clone, PartialEq)]
enum Miss {
    /// The driver timed out or answered after the read timeout.
    Late,
    /// A reading outside the plausible range.
    Implausible(PowerReadings),
    Driver(CoreError),
}

/// Cheap, cloneable read side of the sampler.
#[derive(Clone)]
pub struct TelemetryFeed {
    shared: Arc<Shared>,
    clock: SharedClock,
    max_age: Duration,
}

impl TelemetryFeed {
    /// Latest valid sample tagged with its age and staleness. Never blocks on
    /// the driver.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let now = self.clock.now();
        let latest = lock(&self.shared.latest);
        let age = latest.sample.map(|s| s.age(now));
        let stale = latest.state == SamplerState::Stale
            || age.is_none_or(|a| a > self.max_age);
        TelemetrySnapshot {
            sample: latest.sample,
            stale,
            state: latest.state,
            age,
        }
    }

    /// Completed polls, successful or not.
    pub fn polls(&self) -> u64 {
        self.shared.polls.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TelemetryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryFeed")
            .field("max_age", &self.max_age)
            .field("polls", &self.polls())
            .finish_non_exhaustive()
    }
}

/// Everything the sampler needs except the driver: the clock, settings,
/// published state and fault sink.
struct Recorder {
    clock: SharedClock,
    cfg: TelemetryCfg,
    shared: Arc<Shared>,
    faults: Arc<FaultMonitor>,
}

impl Recorder {
    /// Mark a read as started.
    fn begin(&self) -> Instant {
        let started = self.clock.now();
        lock(&self.shared.latest).state = SamplerState::Sampling;
        started
    }

    /// Publish the result of a read that began at `started`.
    fn finish(&self, result: DriverResult<PowerReadings>, started: Instant) -> SamplerState {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(started);

        let outcome = match result {
            Ok(_) if elapsed > self.cfg.read_timeout => Err(Miss::Late),
            Ok(r) if self.plausible(&r) => Ok(r),
            Ok(r) => Err(Miss::Implausible(r)),
            Err(e) => match map_hw_error(&*e) {
                CoreError::Timeout => Err(Miss::Late),
                other => Err(Miss::Driver(other)),
            },
        };

        let r = match outcome {
            Ok(r) => r,
            Err(miss) => return self.miss(miss, now, elapsed),
        };
        let sample = TelemetrySample {
            pv_voltage: r.pv_voltage,
            load_voltage: r.load_voltage,
            current: r.current,
            timestamp: now,
        };
        {
            let mut latest = lock(&self.shared.latest);
            latest.sample = Some(sample);
            latest.state = SamplerState::Idle;
            latest.stale_since = None;
        }
        self.faults.clear_device(Device::PowerMonitor);
        tracing::trace!(
            pv_v = r.pv_voltage,
            load_v = r.load_voltage,
            current_a = r.current,
            "telemetry sample"
        );
        self.shared.polls.fetch_add(1, Ordering::AcqRel);
        SamplerState::Idle
    }

    /// The read that began at `started` is still running past its timeout.
    fn overrun(&self, started: Instant) -> SamplerState {
        let now = self.clock.now();
        self.miss(Miss::Late, now, now.saturating_duration_since(started))
    }

    fn miss(&self, miss: Miss, now: Instant, elapsed: Duration) -> SamplerState {
        let since = {
            let mut latest = lock(&self.shared.latest);
            latest.state = SamplerState::Stale;
            *latest.stale_since.get_or_insert(now)
        };
        match &miss {
            Miss::Late => {
                tracing::debug!(elapsed_ms = millis(elapsed), "telemetry read timed out");
            }
            Miss::Implausible(r) => {
                tracing::warn!(?r, "telemetry reading out of range");
                self.faults
                    .report(Device::PowerMonitor, FaultKind::OutOfRange, now);
            }
            Miss::Driver(e) => {
                tracing::warn!(error = %e, "telemetry read failed");
                self.faults.report(Device::PowerMonitor, e.fault_kind(), now);
            }
        }
        self.faults.observe_stale(Some(since), now);
        self.shared.polls.fetch_add(1, Ordering::AcqRel);
        SamplerState::Stale
    }

    fn plausible(&self, r: &PowerReadings) -> bool {
        let volt_ok = |v: f32| v.is_finite() && (0.0..=self.cfg.max_voltage).contains(&v);
        volt_ok(r.pv_voltage)
            && volt_ok(r.load_voltage)
            && r.current.is_finite()
            && (0.0..=self.cfg.max_current).contains(&r.current)
    }

    /// Tick loop of the telemetry thread. At most one read is outstanding; a
    /// read that overruns its timeout counts as a miss on every tick until the
    /// driver finally answers.
    fn run(
        &self,
        requests: xch::Sender<()>,
        results: xch::Receiver<DriverResult<PowerReadings>>,
        stop: xch::Receiver<()>,
    ) {
        let mut outstanding: Option<Instant> = None;
        loop {
            let tick = Instant::now();
            let (started, sent) = match outstanding {
                Some(started) => (started, true),
                None => (self.begin(), requests.send(()).is_ok()),
            };
            let wait = if sent {
                xch::select! {
                    recv(results) -> msg => msg.map_or_else(|_| Wait::Done(Err(reader_stopped())), Wait::Done),
                    recv(stop) -> _ => Wait::Stop,
                    default(self.cfg.read_timeout) => Wait::Overrun,
                }
            } else {
                Wait::Done(Err(reader_stopped()))
            };
            match wait {
                Wait::Done(result) => {
                    self.finish(result, started);
                    outstanding = None;
                }
                Wait::Overrun => {
                    self.overrun(started);
                    outstanding = Some(started);
                }
                Wait::Stop => break,
            }
            match stop.recv_timeout(self.cfg.period.saturating_sub(tick.elapsed())) {
                Err(xch::RecvTimeoutError::Timeout) => {}
                // explicit stop or handle dropped
                _ => break,
            }
        }
    }
}

enum Wait {
    Done(DriverResult<PowerReadings>),
    Overrun,
    Stop,
}

fn reader_stopped() -> Box<dyn std::error::Error + Send + Sync> {
    "power monitor reader stopped".into()
}

pub struct TelemetrySampler<M> {
    monitor: M,
    rec: Recorder,
}

impl<M: PowerMonitorDriver> TelemetrySampler<M> {
    pub fn new(monitor: M, cfg: TelemetryCfg, clock: SharedClock, faults: Arc<FaultMonitor>) -> Self {
        Self {
            monitor,
            rec: Recorder {
                clock,
                cfg,
                shared: Arc::new(Shared::default()),
                faults,
            },
        }
    }

    pub fn feed(&self) -> TelemetryFeed {
        TelemetryFeed {
            shared: Arc::clone(&self.rec.shared),
            clock: Arc::clone(&self.rec.clock),
            max_age: self.rec.cfg.max_age,
        }
    }

    /// Run one read on the calling thread and publish the result. Returns the
    /// state the sampler settled in.
    pub fn poll_once(&mut self) -> SamplerState {
        let started = self.rec.begin();
        let result = self.monitor.readings(self.rec.cfg.read_timeout);
        self.rec.finish(result, started)
    }
}

impl<M: PowerMonitorDriver + Send + 'static> TelemetrySampler<M> {
    /// Move the sampler onto its own thread, polling every `period`. The
    /// driver lives on a separate reader thread so a hung read cannot stall
    /// the tick loop.
    pub fn spawn(self) -> Result<SamplerHandle, BuildError> {
        let Self { mut monitor, rec } = self;
        let read_timeout = rec.cfg.read_timeout;

        let (req_tx, req_rx) = xch::bounded::<()>(1);
        let (res_tx, res_rx) = xch::bounded::<DriverResult<PowerReadings>>(1);
        let reader = thread::Builder::new()
            .name("reef-power-read".into())
            .spawn(move || {
                while req_rx.recv().is_ok() {
                    if res_tx.send(monitor.readings(read_timeout)).is_err() {
                        break;
                    }
                }
                tracing::trace!("power monitor reader exiting");
            })
            .map_err(|_| BuildError::Spawn("power monitor reader"))?;

        let (stop_tx, stop_rx) = xch::bounded::<()>(0);
        let join = thread::Builder::new()
            .name("reef-telemetry".into())
            .spawn(move || {
                rec.run(req_tx, res_rx, stop_rx);
                // channels are gone; the reader exits once its read returns
                if let Err(e) = reader.join() {
                    tracing::warn!(?e, "power monitor reader panicked");
                }
                tracing::trace!("telemetry thread exiting");
            })
            .map_err(|_| BuildError::Spawn("telemetry"))?;
        Ok(SamplerHandle {
            stop: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Stops and joins the sampler thread on drop.
#[derive(Debug)]
pub struct SamplerHandle {
    stop: Option<xch::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        // Disconnecting wakes the thread out of its wait.
        self.stop.take();
        if let Some(handle) = self.join.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("telemetry thread joined"),
                Err(e) => tracing::warn!(?e, "telemetry thread panicked"),
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
