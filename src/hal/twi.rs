//! TWI (I2C) HAL implementation

use avr_device::atmega128a::TWI;
use core::marker::PhantomData;
use embedded_hal::blocking::i2c::{Write, WriteRead};

/// Status polls before a transfer is declared stuck
const TWI_TIMEOUT_POLLS: u16 = 10_000;

/// TWI speed modes
#[derive(Clone, Copy)]
pub enum TwiSpeed {
    Standard100k,
    Fast400k,
}

/// TWI status codes
#[derive(Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum TwiStatus {
    StartTransmitted = 0x08,
    RepStartTransmitted = 0x10,
    AddrWriteAck = 0x18,
    AddrWriteNack = 0x20,
    DataWriteAck = 0x28,
    DataWriteNack = 0x30,
    ArbitrationLost = 0x38,
    AddrReadAck = 0x40,
    AddrReadNack = 0x48,
    DataReadAck = 0x50,
    DataReadNack = 0x58,
}

/// Bus-level failure, carrying the raw status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwiError {
    Timeout,
    Status(u8),
}

/// TWI peripheral driver
pub struct Twi {
    _twi: PhantomData<TWI>,
}

impl Twi {
    /// Create new TWI instance
    pub fn new() -> Self {
        unsafe {
            let p = TWI::ptr();

            // Enable TWI with internal pullups
            (*p).twcr.write(|w| w.bits(0x44));

            // Default to 100kHz with 16MHz CPU clock
            (*p).twbr.write(|w| w.bits(72));
            (*p).twsr.write(|w| w.bits(0));
        }

        Self { _twi: PhantomData }
    }

    /// Set TWI speed
    pub fn set_speed(&mut self, speed: TwiSpeed) {
        unsafe {
            let p = TWI::ptr();
            match speed {
                TwiSpeed::Standard100k => (*p).twbr.write(|w| w.bits(72)),
                TwiSpeed::Fast400k => (*p).twbr.write(|w| w.bits(12)),
            }
            (*p).twsr.write(|w| w.bits(0));
        }
    }

    fn wait_complete(&mut self) -> Result<u8, TwiError> {
        unsafe {
            let p = TWI::ptr();
            let mut polls = TWI_TIMEOUT_POLLS;
            while (*p).twcr.read().bits() & 0x80 == 0 {
                polls -= 1;
                if polls == 0 {
                    return Err(TwiError::Timeout);
                }
            }
            Ok((*p).twsr.read().bits() & 0xF8)
        }
    }

    fn expect(status: u8, allowed: &[TwiStatus]) -> Result<(), TwiError> {
        if allowed.iter().any(|s| *s as u8 == status) {
            Ok(())
        } else {
            Err(TwiError::Status(status))
        }
    }

    /// Send (repeated) START
    fn start(&mut self) -> Result<(), TwiError> {
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(0xA4)) };
        let status = self.wait_complete()?;
        Self::expect(status, &[TwiStatus::StartTransmitted, TwiStatus::RepStartTransmitted])
    }

    /// Send STOP
    fn stop(&mut self) {
        unsafe {
            let p = TWI::ptr();
            (*p).twcr.write(|w| w.bits(0x94));
            let mut polls = TWI_TIMEOUT_POLLS;
            while (*p).twcr.read().bits() & 0x10 != 0 && polls > 0 {
                polls -= 1;
            }
        }
    }

    fn write_address(&mut self, addr: u8, read: bool) -> Result<(), TwiError> {
        let status = self.transmit((addr << 1) | (read as u8))?;
        if read {
            Self::expect(status, &[TwiStatus::AddrReadAck])
        } else {
            Self::expect(status, &[TwiStatus::AddrWriteAck])
        }
    }

    fn transmit(&mut self, byte: u8) -> Result<u8, TwiError> {
        unsafe {
            let p = TWI::ptr();
            (*p).twdr.write(|w| w.bits(byte));
            (*p).twcr.write(|w| w.bits(0x84));
        }
        self.wait_complete()
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TwiError> {
        let status = self.transmit(byte)?;
        Self::expect(status, &[TwiStatus::DataWriteAck])
    }

    fn read_byte(&mut self, ack: bool) -> Result<u8, TwiError> {
        unsafe { (*TWI::ptr()).twcr.write(|w| w.bits(if ack { 0xC4 } else { 0x84 })) };
        let status = self.wait_complete()?;
        Self::expect(status, &[TwiStatus::DataReadAck, TwiStatus::DataReadNack])?;
        Ok(unsafe { (*TWI::ptr()).twdr.read().bits() })
    }

    fn write_frame(&mut self, addr: u8, bytes: &[u8]) -> Result<(), TwiError> {
        self.start()?;
        self.write_address(addr, false)?;
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    fn read_frame(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), TwiError> {
        self.start()?;
        self.write_address(addr, true)?;
        let last = buffer.len().saturating_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read_byte(i < last)?;
        }
        Ok(())
    }
}

impl Write for Twi {
    type Error = TwiError;

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), TwiError> {
        let result = self.write_frame(addr, bytes);
        self.stop();
        result
    }
}

impl WriteRead for Twi {
    type Error = TwiError;

    fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), TwiError> {
        let result = self
            .write_frame(addr, bytes)
            .and_then(|_| self.read_frame(addr, buffer));
        self.stop();
        result
    }
}

impl Default for Twi {
    fn default() -> Self {
        Self::new()
    }
}
