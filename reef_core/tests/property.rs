use std::time::{Duration, Instant};

use proptest::prelude::*;
use reef_core::debouncer::Debouncer;
use reef_core::{
    Actuator, CommandError, DeviceCommand, FaultKind, Setpoint, ValidationPolicy, validate,
};
use reef_core::faults::FaultMonitor;

const MS: Duration = Duration::from_millis(1);

fn actuator() -> impl Strategy<Value = Actuator> {
    prop_oneof![
        Just(Actuator::Pump),
        Just(Actuator::WaveMaker),
        Just(Actuator::Feeder),
        Just(Actuator::Lighting),
    ]
}

proptest! {
    #[test]
    fn percent_accepted_iff_in_range(p in any::<i32>()) {
        match validate(DeviceCommand::pump_speed(p), ValidationPolicy::Reject) {
            Ok(v) => {
                prop_assert!((0..=100).contains(&p));
                prop_assert_eq!(v.setpoint(), Setpoint::Percent(u8::try_from(p).unwrap()));
            }
            Err(e) => {
                prop_assert!(!(0..=100).contains(&p));
                prop_assert_eq!(e, CommandError::OutOfRange { target: Actuator::Pump, value: p });
            }
        }
    }

    #[test]
    fn clamp_always_lands_in_range(p in any::<i32>()) {
        let v = validate(DeviceCommand::lighting_intensity(p), ValidationPolicy::Clamp).unwrap();
        match v.setpoint() {
            Setpoint::Percent(out) => prop_assert!(out <= 100),
            other => prop_assert!(false, "unexpected {other:?}"),
        }
    }

    /// A burst inside one window produces exactly one dispatch: its last value.
    #[test]
    fn burst_yields_only_last_value(
        values in prop::collection::vec(0u8..=100, 1..50),
        step_ms in 0u32..2,
    ) {
        let mut d = Debouncer::new(100 * MS, 2_000 * MS);
        let t0 = Instant::now();
        let mut last = None;
        for (i, v) in values.iter().enumerate() {
            let at = t0 + MS * step_ms * u32::try_from(i).unwrap();
            d.offer(Actuator::Pump, Setpoint::Percent(*v), at);
            last = Some(Setpoint::Percent(*v));
        }
        let due = d.take_due(t0 + 100 * MS);
        prop_assert_eq!(due, vec![(Actuator::Pump, last.unwrap())]);
        d.complete(Actuator::Pump, t0 + 101 * MS);
        prop_assert!(d.is_idle(Actuator::Pump));
    }

    /// Never more than one call in flight per actuator, whatever the order
    /// of offers, ticks and completions.
    #[test]
    fn at_most_one_in_flight(ops in prop::collection::vec((actuator(), 0u8..3), 1..200)) {
        let mut d = Debouncer::new(5 * MS, 2_000 * MS);
        let t0 = Instant::now();
        let mut in_flight = [false; 4];
        let idx = |a: Actuator| Actuator::ALL.iter().position(|x| *x == a).unwrap();
        for (step, (target, op)) in ops.into_iter().enumerate() {
            let now = t0 + MS * u32::try_from(step).unwrap();
            match op {
                0 => { d.offer(target, Setpoint::Percent(7), now); }
                1 => {
                    for (t, _) in d.take_due(now) {
                        prop_assert!(!in_flight[idx(t)], "{t} dispatched twice");
                        in_flight[idx(t)] = true;
                    }
                }
                _ => {
                    if in_flight[idx(target)] {
                        in_flight[idx(target)] = d.complete(target, now).is_some();
                    }
                }
            }
        }
    }

    /// Repeated reports of one condition never grow the active set.
    #[test]
    fn duplicate_faults_collapse(n in 1usize..100) {
        let m = FaultMonitor::new(Duration::from_secs(10));
        let t0 = Instant::now();
        for i in 0..n {
            m.report(Actuator::Feeder.into(), FaultKind::DriverError, t0 + MS * u32::try_from(i).unwrap());
        }
        let active = m.active();
        prop_assert_eq!(active.len(), 1);
        prop_assert_eq!(active[0].occurrences as usize, n);
    }
}
