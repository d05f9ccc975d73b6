#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Reef controller core (hardware-agnostic).
//!
//! Sits between user-facing surfaces and the device drivers in
//! `reef_traits`. UI code submits `DeviceCommand`s and reads snapshots; the
//! core owns every driver and is the only thing that calls them.
//!
//! ## Architecture
//!
//! - **Validation** (`validator`): raw commands become `ValidCommand`s or are
//!   refused before any hardware is touched.
//! - **Debounce** (`debouncer`, `dispatch`): bursts to one actuator collapse
//!   to the latest value; at most one driver call per actuator is in flight.
//! - **Telemetry** (`sampler`): a background thread polls the power monitor
//!   and publishes the last valid sample with staleness tracking.
//! - **Faults** (`faults`): driver failures and stale telemetry become
//!   deduplicated `FaultRecord`s, cleared by the next success.
//!
//! ## Threads
//!
//! `ReefCore::build` starts one dispatch thread, one worker per attached
//! actuator and one telemetry thread. All of them are joined by
//! `ReefCore::shutdown` (or drop).

pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod debouncer;
pub(crate) mod dispatch;
pub mod error;
pub mod faults;
pub mod hw_error;
pub mod mocks;
pub mod sampler;
pub(crate) mod state;
pub mod status;
pub mod types;
pub mod util;
pub mod validator;

pub use crate::builder::ReefCoreBuilder;
pub use crate::config::{CoreSettings, DebounceCfg, FaultCfg, TelemetryCfg};
pub use crate::core::ReefCore;
pub use crate::error::{BuildError, CommandError, CoreError};
pub use crate::status::{Health, SamplerState};
pub use crate::types::{
    Actuator, CommandValue, Device, DeviceCommand, DeviceState, FaultKind, FaultRecord, Setpoint,
    TelemetrySample, TelemetrySnapshot, ValidCommand,
};
pub use crate::util::SharedClock;
pub use crate::validator::{ValidationPolicy, validate};
