use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("driver timeout")]
    Timeout,
    #[error("ina219 conversion-ready timeout")]
    ConversionTimeout,
    #[error("percent out of range: {0} (expected 0..=100)")]
    OutOfRange(u8),
    #[error("feed cycle already in progress")]
    Busy,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;

/// Reject percentages above 100 before touching hardware.
pub fn check_percent(percent: u8) -> Result<u8> {
    if percent > 100 {
        return Err(HwError::OutOfRange(percent));
    }
    Ok(percent)
}
