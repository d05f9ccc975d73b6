//! Maps `Box<dyn Error>` from trait boundaries to typed `CoreError`.
//!
//! The traits in `reef_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `reef_hardware::HwError` downcasting.

use crate::error::CoreError;

/// Map a trait-boundary error to a typed `CoreError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> CoreError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use reef_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::ConversionTimeout => CoreError::Timeout,
                HwError::OutOfRange(p) => CoreError::OutOfRange(format!("{p}%")),
                HwError::Busy => CoreError::Busy,
                other => CoreError::Driver(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        CoreError::Timeout
    } else if lower.contains("busy") {
        CoreError::Busy
    } else if lower.contains("out of range") {
        CoreError::OutOfRange(s)
    } else {
        CoreError::Driver(s)
    }
}

#[cfg(test)]
mod tests {
    use super::map_hw_error;
    use crate::error::CoreError;

    fn boxed(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
        msg.into()
    }

    #[test]
    fn string_heuristics() {
        assert_eq!(map_hw_error(&*boxed("sensor timeout")), CoreError::Timeout);
        assert_eq!(map_hw_error(&*boxed("feeder Busy")), CoreError::Busy);
        assert!(matches!(
            map_hw_error(&*boxed("duty out of range")),
            CoreError::OutOfRange(_)
        ));
        assert_eq!(
            map_hw_error(&*boxed("i2c nack")),
            CoreError::Driver("i2c nack".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hw_error() {
        use reef_hardware::error::HwError;
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::ConversionTimeout);
        assert_eq!(map_hw_error(&*e), CoreError::Timeout);
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Gpio("pin 18".into()));
        assert!(matches!(map_hw_error(&*e), CoreError::Driver(m) if m.contains("pin 18")));
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::OutOfRange(120));
        assert!(matches!(map_hw_error(&*e), CoreError::OutOfRange(_)));
    }
}
