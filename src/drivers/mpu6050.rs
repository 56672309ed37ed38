//! MPU6050 6-axis IMU driver
//!
//! Register addresses and bit values follow the MPU-6000/MPU-6050 register map
//! revision 4.2 and must stay byte-for-byte compatible with the part.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::config::{MPU6050_ADDR, MPU6050_WHO_AM_I, RESET_SETTLE_MS};
use crate::hal::RegisterBus;

// MPU6050 registers
pub const REG_XA_OFFSET_H: u8 = 0x06;
pub const REG_YA_OFFSET_H: u8 = 0x08;
pub const REG_ZA_OFFSET_H: u8 = 0x0A;
pub const REG_XG_OFFS_USRH: u8 = 0x13;
pub const REG_XG_OFFS_USRL: u8 = 0x14;
pub const REG_YG_OFFS_USRH: u8 = 0x15;
pub const REG_YG_OFFS_USRL: u8 = 0x16;
pub const REG_ZG_OFFS_USRH: u8 = 0x17;
pub const REG_ZG_OFFS_USRL: u8 = 0x18;
pub const REG_SMPLRT_DIV: u8 = 0x19;
pub const REG_CONFIG: u8 = 0x1A;
pub const REG_GYRO_CONFIG: u8 = 0x1B;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_FIFO_EN: u8 = 0x23;
pub const REG_I2C_MST_CTRL: u8 = 0x24;
pub const REG_INT_PIN_CFG: u8 = 0x37;
pub const REG_INT_ENABLE: u8 = 0x38;
pub const REG_INT_STATUS: u8 = 0x3A;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B;
pub const REG_GYRO_XOUT_H: u8 = 0x43;
pub const REG_USER_CTRL: u8 = 0x6A;
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_PWR_MGMT_2: u8 = 0x6C;
pub const REG_FIFO_COUNTH: u8 = 0x72;
pub const REG_FIFO_R_W: u8 = 0x74;
pub const REG_WHO_AM_I: u8 = 0x75;

/// PWR_MGMT_1 device reset bit
pub const PWR_DEVICE_RESET: u8 = 0x80;
/// PWR_MGMT_1 clock source: PLL with X axis gyroscope reference
pub const PWR_CLOCK_PLL_XGYRO: u8 = 0x01;
/// INT_STATUS data-ready bit
pub const INT_DATA_READY: u8 = 0x01;

// Active-mode settings
const CONFIG_DLPF_44HZ: u8 = 0x03;
const SMPLRT_DIV_200HZ: u8 = 0x04;
// Active high, push-pull, latched until INT_STATUS is read, I2C bypass
const INT_PIN_CFG_ACTIVE: u8 = 0x22;
// Self-test bits [7:5] and full-scale bits [4:3]
const FS_SELF_TEST_MASK: u8 = 0xF8;

/// Driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Register read or write failed
    Bus(E),
    /// Calibration window produced no complete FIFO packet
    InsufficientSamples,
    /// WHO_AM_I returned something other than the expected identity
    UnexpectedDevice(u8),
}

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    G2 = 0,  // ±2g
    G4 = 1,  // ±4g
    G8 = 2,  // ±8g
    G16 = 3, // ±16g
}

impl AccelRange {
    /// Full-scale magnitude in g
    pub const fn full_scale(self) -> u16 {
        match self {
            AccelRange::G2 => 2,
            AccelRange::G4 => 4,
            AccelRange::G8 => 8,
            AccelRange::G16 => 16,
        }
    }

    pub const fn scale_factor(self) -> ScaleFactor {
        ScaleFactor::new(self.full_scale())
    }

    const fn fs_bits(self) -> u8 {
        (self as u8) << 3
    }
}

/// Gyroscope full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    Dps250 = 0,  // ±250°/s
    Dps500 = 1,  // ±500°/s
    Dps1000 = 2, // ±1000°/s
    Dps2000 = 3, // ±2000°/s
}

impl GyroRange {
    /// Full-scale magnitude in degrees per second
    pub const fn full_scale(self) -> u16 {
        match self {
            GyroRange::Dps250 => 250,
            GyroRange::Dps500 => 500,
            GyroRange::Dps1000 => 1000,
            GyroRange::Dps2000 => 2000,
        }
    }

    pub const fn scale_factor(self) -> ScaleFactor {
        ScaleFactor::new(self.full_scale())
    }

    const fn fs_bits(self) -> u8 {
        (self as u8) << 3
    }
}

/// Physical units per raw count, kept as the exact ratio `range / 32768`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFactor {
    full_scale: u16,
}

impl ScaleFactor {
    /// Number of counts spanning one half of the signed 16-bit domain
    pub const COUNTS: u32 = 32768;

    pub const fn new(full_scale: u16) -> Self {
        Self { full_scale }
    }

    pub const fn full_scale(&self) -> u16 {
        self.full_scale
    }

    /// Physical units represented by one count
    pub fn resolution(&self) -> f32 {
        self.full_scale as f32 / Self::COUNTS as f32
    }
}

/// Scales in force after `configure`, handed explicitly to the sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorScales {
    pub gyro_range: GyroRange,
    pub accel_range: AccelRange,
    pub gyro: ScaleFactor,
    pub accel: ScaleFactor,
}

impl SensorScales {
    pub const fn new(gyro_range: GyroRange, accel_range: AccelRange) -> Self {
        Self {
            gyro_range,
            accel_range,
            gyro: gyro_range.scale_factor(),
            accel: accel_range.scale_factor(),
        }
    }
}

/// Sensor class whose output registers are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorClass {
    Accel,
    Gyro,
}

impl SensorClass {
    const fn output_register(self) -> u8 {
        match self {
            SensorClass::Accel => REG_ACCEL_XOUT_H,
            SensorClass::Gyro => REG_GYRO_XOUT_H,
        }
    }
}

/// Raw signed counts for three axes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Decode three big-endian words
    pub fn from_be_bytes(data: &[u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([data[0], data[1]]),
            y: i16::from_be_bytes([data[2], data[3]]),
            z: i16::from_be_bytes([data[4], data[5]]),
        }
    }

    pub const fn axes(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

/// MPU6050 driver
pub struct Mpu6050<I2C, D> {
    bus: RegisterBus<I2C>,
    delay: D,
    address: u8,
}

impl<I2C, D, E> Mpu6050<I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u16>,
{
    /// Create a driver for the default address
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, MPU6050_ADDR)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            bus: RegisterBus::new(i2c),
            delay,
            address,
        }
    }

    /// Give back the bus and delay
    pub fn release(self) -> (I2C, D) {
        (self.bus.release(), self.delay)
    }

    pub fn who_am_i(&mut self) -> Result<u8, Error<E>> {
        self.read_reg(REG_WHO_AM_I)
    }

    /// Liveness check against the fixed identity register
    pub fn identify(&mut self) -> Result<bool, Error<E>> {
        Ok(self.who_am_i()? == MPU6050_WHO_AM_I)
    }

    /// Reset every register to its power-on default.
    ///
    /// Registers are undefined until the settle delay has elapsed, so this
    /// blocks for the whole of it.
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.write_reg(REG_PWR_MGMT_1, PWR_DEVICE_RESET)?;
        self.settle(RESET_SETTLE_MS);
        Ok(())
    }

    /// Configure active-mode sampling and full-scale ranges.
    ///
    /// The clock source is selected first; filter and rate settings depend on it.
    pub fn configure(
        &mut self,
        gyro: GyroRange,
        accel: AccelRange,
    ) -> Result<SensorScales, Error<E>> {
        self.write_reg(REG_PWR_MGMT_1, PWR_CLOCK_PLL_XGYRO)?;
        self.write_reg(REG_CONFIG, CONFIG_DLPF_44HZ)?;
        self.write_reg(REG_SMPLRT_DIV, SMPLRT_DIV_200HZ)?;

        let c = self.read_reg(REG_GYRO_CONFIG)?;
        self.write_reg(REG_GYRO_CONFIG, (c & !FS_SELF_TEST_MASK) | gyro.fs_bits())?;

        let c = self.read_reg(REG_ACCEL_CONFIG)?;
        self.write_reg(REG_ACCEL_CONFIG, (c & !FS_SELF_TEST_MASK) | accel.fs_bits())?;

        self.write_reg(REG_INT_PIN_CFG, INT_PIN_CFG_ACTIVE)?;
        self.write_reg(REG_INT_ENABLE, INT_DATA_READY)?;

        Ok(SensorScales::new(gyro, accel))
    }

    /// Whether a new sample has landed in the output registers
    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.read_reg(REG_INT_STATUS)? & INT_DATA_READY != 0)
    }

    /// Burst-read one sample for a sensor class
    pub fn read_axes(&mut self, class: SensorClass) -> Result<RawSample, Error<E>> {
        let data: [u8; 6] = self
            .bus
            .read_array(self.address, class.output_register())
            .map_err(Error::Bus)?;
        Ok(RawSample::from_be_bytes(&data))
    }

    /// Zero the gyro offset registers
    pub fn clear_gyro_offsets(&mut self) -> Result<(), Error<E>> {
        self.write_gyro_offsets(&[0; 6])
    }

    pub(crate) fn write_gyro_offsets(&mut self, bytes: &[u8; 6]) -> Result<(), Error<E>> {
        const REGS: [u8; 6] = [
            REG_XG_OFFS_USRH,
            REG_XG_OFFS_USRL,
            REG_YG_OFFS_USRH,
            REG_YG_OFFS_USRL,
            REG_ZG_OFFS_USRH,
            REG_ZG_OFFS_USRL,
        ];
        for (reg, value) in REGS.iter().zip(bytes.iter()) {
            self.write_reg(*reg, *value)?;
        }
        Ok(())
    }

    pub(crate) fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<E>> {
        self.bus
            .write_register(self.address, reg, value)
            .map_err(Error::Bus)
    }

    pub(crate) fn read_reg(&mut self, reg: u8) -> Result<u8, Error<E>> {
        self.bus.read_register(self.address, reg).map_err(Error::Bus)
    }

    pub(crate) fn read_regs<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], Error<E>> {
        self.bus.read_array(self.address, reg).map_err(Error::Bus)
    }

    pub(crate) fn settle(&mut self, ms: u16) {
        self.delay.delay_ms(ms);
    }
}
