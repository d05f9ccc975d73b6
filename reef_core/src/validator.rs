//! Command validation: the only way to obtain a `ValidCommand`.

use crate::error::CommandError;
use crate::types::{Actuator, CommandValue, DeviceCommand, Setpoint, ValidCommand};

/// What to do with percentages outside 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Refuse with `OutOfRange` so UI bugs surface.
    #[default]
    Reject,
    /// Silently clamp into range.
    Clamp,
}

/// Check a raw command against its target's value kind and range.
///
/// Pure; never touches shared state.
pub fn validate(cmd: DeviceCommand, policy: ValidationPolicy) -> Result<ValidCommand, CommandError> {
    let setpoint = match (cmd.target, cmd.value) {
        (Actuator::Pump | Actuator::Lighting, CommandValue::Percent(p)) => {
            Setpoint::Percent(percent(cmd.target, p, policy)?)
        }
        (Actuator::WaveMaker, CommandValue::Switch(on)) => Setpoint::Switch(on),
        (Actuator::Feeder, CommandValue::Trigger) => Setpoint::Trigger,
        (target, value) => return Err(CommandError::InvalidCommand { target, value }),
    };
    Ok(ValidCommand::new(cmd.target, setpoint))
}

#[inline]
fn percent(target: Actuator, value: i32, policy: ValidationPolicy) -> Result<u8, CommandError> {
    match u8::try_from(value) {
        Ok(p) if p <= 100 => Ok(p),
        _ => match policy {
            ValidationPolicy::Reject => Err(CommandError::OutOfRange { target, value }),
            ValidationPolicy::Clamp => Ok(u8::try_from(value.clamp(0, 100)).unwrap_or(100)),
        },
    }
}
