//! Register access over a blocking I2C bus
//!
//! Pure transport: every call is one bus transaction and any failure is
//! handed back to the caller untouched. Retry policy lives above this layer.

use embedded_hal::blocking::i2c::{Write, WriteRead};

/// Byte-level register bus
pub struct RegisterBus<I2C> {
    i2c: I2C,
}

impl<I2C, E> RegisterBus<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Wrap an initialized bus
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Give the bus handle back
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Write a single register
    pub fn write_register(&mut self, device: u8, reg: u8, value: u8) -> Result<(), E> {
        self.i2c.write(device, &[reg, value])
    }

    /// Read a single register
    pub fn read_register(&mut self, device: u8, reg: u8) -> Result<u8, E> {
        let mut value = [0u8];
        self.i2c.write_read(device, &[reg], &mut value)?;
        Ok(value[0])
    }

    /// Read `buffer.len()` consecutive bytes starting at `reg`
    pub fn read_burst(&mut self, device: u8, reg: u8, buffer: &mut [u8]) -> Result<(), E> {
        self.i2c.write_read(device, &[reg], buffer)
    }

    /// Fixed-size burst read
    pub fn read_array<const N: usize>(&mut self, device: u8, reg: u8) -> Result<[u8; N], E> {
        let mut buffer = [0u8; N];
        self.read_burst(device, reg, &mut buffer)?;
        Ok(buffer)
    }
}
