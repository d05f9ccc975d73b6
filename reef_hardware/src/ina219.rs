use std::time::Duration;
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::{bus_volts, shunt_volts, wait_until_ready_with_timeout};

const REG_SHUNT_VOLTAGE: u8 = 0x01;
const REG_BUS_VOLTAGE: u8 = 0x02;
/// Conversion-ready flag in the bus voltage register.
const CNVR: u16 = 0x0002;

/// One INA219 current/voltage monitor on the shared I²C bus.
pub struct Ina219 {
    i2c: rppal::i2c::I2c,
    address: u16,
    shunt_ohms: f32,
}

impl Ina219 {
    pub fn new(bus: u8, address: u16, shunt_ohms: f32) -> Result<Self> {
        let i2c = rppal::i2c::I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            i2c,
            address,
            shunt_ohms,
        })
    }

    fn read_bytes(&mut self, reg: u8) -> Result<[u8; 2]> {
        self.i2c
            .set_slave_address(self.address)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(&[reg], &mut buf)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(buf)
    }

    fn read_register(&mut self, reg: u8) -> Result<u16> {
        self.read_bytes(reg).map(u16::from_be_bytes)
    }

    /// Bus voltage in volts, waiting for a fresh conversion.
    pub fn bus_voltage(&mut self, timeout: Duration) -> Result<f32> {
        wait_until_ready_with_timeout(
            || Ok(self.read_register(REG_BUS_VOLTAGE)? & CNVR != 0),
            timeout,
            Duration::from_millis(1),
        )?;
        let raw = self.read_register(REG_BUS_VOLTAGE)?;
        let volts = bus_volts(raw);
        trace!(address = self.address, raw, volts, "ina219 bus voltage");
        Ok(volts)
    }

    /// Current through the shunt in amperes.
    pub fn current(&mut self) -> Result<f32> {
        let raw = self.read_bytes(REG_SHUNT_VOLTAGE)?;
        let amps = shunt_volts(raw) / self.shunt_ohms;
        trace!(address = self.address, raw = ?raw, amps, "ina219 current");
        Ok(amps)
    }
}
