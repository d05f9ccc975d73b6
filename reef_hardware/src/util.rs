use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// INA219 shunt voltage LSB is 10 µV.
const SHUNT_LSB_V: f32 = 0.000_01;
/// INA219 bus voltage LSB is 4 mV after dropping the three status bits.
const BUS_LSB_V: f32 = 0.004;

/// Wait until `ready` returns true or the timeout expires.
/// Sleeps in small intervals to avoid CPU spinning. Errors from the predicate
/// are returned as-is.
pub fn wait_until_ready_with_timeout(
    mut ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now().checked_add(timeout);
    while !ready()? {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(HwError::ConversionTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Shunt voltage in volts from the raw big-endian register bytes.
/// The register is two's complement.
pub fn shunt_volts(raw: [u8; 2]) -> f32 {
    f32::from(i16::from_be_bytes(raw)) * SHUNT_LSB_V
}

/// Bus voltage in volts from the raw register value.
pub fn bus_volts(raw: u16) -> f32 {
    f32::from(raw >> 3) * BUS_LSB_V
}

/// Whole milliseconds for log fields, saturating.
pub fn millis_u64(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shunt_register_is_signed() {
        assert_eq!(shunt_volts([0x00, 0x00]), 0.0);
        // 0x0FA0 = 4000 LSB = 40 mV
        assert!((shunt_volts([0x0F, 0xA0]) - 0.04).abs() < 1e-6);
        // 0xF060 = -4000 LSB, reverse current
        assert!((shunt_volts([0xF0, 0x60]) + 0.04).abs() < 1e-6);
        assert!((shunt_volts([0x80, 0x00]) + 0.327_68).abs() < 1e-6);
    }

    #[test]
    fn bus_register_drops_status_bits() {
        // 12.0 V = 3000 LSB, shifted past CNVR/OVF
        assert!((bus_volts((3000 << 3) | 0b011) - 12.0).abs() < 1e-4);
    }

    #[test]
    fn millis_saturate() {
        assert_eq!(millis_u64(Duration::from_millis(250)), 250);
        assert_eq!(millis_u64(Duration::MAX), u64::MAX);
    }

    #[test]
    fn huge_timeout_does_not_panic() {
        let mut n = 0;
        wait_until_ready_with_timeout(
            || {
                n += 1;
                Ok(n > 2)
            },
            Duration::MAX,
            Duration::from_millis(1),
        )
        .expect("ready on third poll");
        assert_eq!(n, 3);
    }
}
