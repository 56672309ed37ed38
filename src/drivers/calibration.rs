//! Sensor calibration routines
//!
//! Bias estimation runs on the device itself: the FIFO collects a short window
//! of at-rest samples at maximum sensitivity, the averages become the bias,
//! and the correction is pushed into the hardware offset registers.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use super::mpu6050::*;
use crate::config::{FIFO_ACCUMULATE_MS, FIFO_RESET_SETTLE_MS, RESET_SETTLE_MS};

/// Bytes per FIFO packet: accel xyz then gyro xyz, 16 bits each
pub const FIFO_PACKET_SIZE: usize = 12;

/// Gyro sensitivity at ±250°/s in counts per °/s
pub const GYRO_CAL_SENSITIVITY: u16 = 131;

/// Accel sensitivity at ±2g in counts per g
pub const ACCEL_CAL_SENSITIVITY: u16 = 16384;

/// Gyro range the bias is measured at
pub const CALIBRATION_GYRO_RANGE: GyroRange = GyroRange::Dps250;

// Calibration-time register values
const USER_CTRL_FIFO_DMP_RESET: u8 = 0x0C;
const USER_CTRL_FIFO_EN: u8 = 0x40;
const FIFO_EN_GYRO_ACCEL: u8 = 0x78;
const CONFIG_DLPF_188HZ: u8 = 0x01;
const SMPLRT_DIV_1KHZ: u8 = 0x00;
const FS_MAX_SENSITIVITY: u8 = 0x00;

// Bit 0 of each accel trim low byte is the temperature compensation flag
const ACCEL_TRIM_TC_BIT: i32 = 0x01;

/// Steady-state offset for one sensor class, in raw counts at a known sensitivity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BiasVector {
    pub counts: [i32; 3],
    /// Counts per physical unit the bias was measured at
    pub sensitivity: u16,
}

impl BiasVector {
    pub const fn new(counts: [i32; 3], sensitivity: u16) -> Self {
        Self { counts, sensitivity }
    }

    /// Bias in physical units (°/s or g)
    pub fn to_units(&self) -> [f32; 3] {
        let s = self.sensitivity.max(1) as f32;
        [
            self.counts[0] as f32 / s,
            self.counts[1] as f32 / s,
            self.counts[2] as f32 / s,
        ]
    }

    /// Re-express the bias in counts of another full-scale range.
    ///
    /// `measured_at` is the full scale this bias was captured with.
    pub fn rescale(&self, measured_at: u16, target: ScaleFactor) -> [i32; 3] {
        let target = target.full_scale().max(1) as i32;
        let measured_at = measured_at as i32;
        [
            self.counts[0] * measured_at / target,
            self.counts[1] * measured_at / target,
            self.counts[2] * measured_at / target,
        ]
    }
}

/// Result of one calibration run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationData {
    pub gyro_bias: BiasVector,
    pub accel_bias: BiasVector,
    /// FIFO packets averaged
    pub packets: u16,
}

/// Per-axis running sums over FIFO packets
#[derive(Debug, Default)]
pub struct BiasAccumulator {
    accel: [i32; 3],
    gyro: [i32; 3],
    packets: u16,
}

impl BiasAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_packet(&mut self, packet: &[u8; FIFO_PACKET_SIZE]) {
        let (accel, gyro) = decode_packet(packet);
        for (sum, value) in self.accel.iter_mut().zip(accel.axes()) {
            *sum += value as i32;
        }
        for (sum, value) in self.gyro.iter_mut().zip(gyro.axes()) {
            *sum += value as i32;
        }
        self.packets += 1;
    }

    pub fn packets(&self) -> u16 {
        self.packets
    }

    /// Average counts `(accel, gyro)`, truncated toward zero.
    ///
    /// `None` when no packet was added.
    pub fn averages(&self) -> Option<([i32; 3], [i32; 3])> {
        if self.packets == 0 {
            return None;
        }
        let n = self.packets as i32;
        Some((self.accel.map(|s| s / n), self.gyro.map(|s| s / n)))
    }
}

/// Split a FIFO packet into accel and gyro samples
pub fn decode_packet(packet: &[u8; FIFO_PACKET_SIZE]) -> (RawSample, RawSample) {
    let mut accel = [0u8; 6];
    let mut gyro = [0u8; 6];
    accel.copy_from_slice(&packet[..6]);
    gyro.copy_from_slice(&packet[6..]);
    (RawSample::from_be_bytes(&accel), RawSample::from_be_bytes(&gyro))
}

/// Remove the 1g gravity term from the vertical accel bias.
///
/// The sign of the average tells which pole the device rests on; an average of
/// exactly zero is treated as resting on the positive pole.
pub fn remove_gravity(vertical: i32) -> i32 {
    if vertical >= 0 {
        vertical - ACCEL_CAL_SENSITIVITY as i32
    } else {
        vertical + ACCEL_CAL_SENSITIVITY as i32
    }
}

/// Gyro offset register pair for an averaged bias.
///
/// The registers take the inverse correction in quarter counts.
pub fn gyro_offset_bytes(bias: i32) -> [u8; 2] {
    let correction = -bias / 4;
    [((correction >> 8) & 0xFF) as u8, (correction & 0xFF) as u8]
}

/// New accel trim register pair from the factory trim and an averaged bias.
///
/// The trim register counts at 2048 LSB/g, hence the division by 8; the
/// temperature compensation bit of the factory low byte is carried over.
pub fn accel_trim_bytes(factory: [u8; 2], bias: i32) -> [u8; 2] {
    let mut trim = i16::from_be_bytes(factory) as i32;
    let tc_bit = trim & ACCEL_TRIM_TC_BIT;
    trim -= bias / 8;
    [((trim >> 8) & 0xFF) as u8, ((trim & 0xFF) | tc_bit) as u8]
}

/// Calibration engine state
pub struct Calibration {
    data: Option<CalibrationData>,
}

impl Calibration {
    pub fn new() -> Self {
        Self { data: None }
    }

    /// Last successful calibration, if any
    pub fn data(&self) -> Option<&CalibrationData> {
        self.data.as_ref()
    }

    pub fn gyro_bias(&self) -> Option<BiasVector> {
        self.data.map(|d| d.gyro_bias)
    }

    pub fn accel_bias(&self) -> Option<BiasVector> {
        self.data.map(|d| d.accel_bias)
    }

    /// Measure gyro and accel bias and load the correction into the device.
    ///
    /// Leaves the device at maximum sensitivity; `configure` must follow.
    /// A bus error aborts at once and nothing is retried here.
    pub fn calibrate<I2C, D, E>(
        &mut self,
        imu: &mut Mpu6050<I2C, D>,
    ) -> Result<CalibrationData, Error<E>>
    where
        I2C: Write<Error = E> + WriteRead<Error = E>,
        D: DelayMs<u16>,
    {
        prepare_device(imu)?;
        let accumulator = drain_fifo(imu)?;

        let (mut accel, gyro) = accumulator
            .averages()
            .ok_or(Error::InsufficientSamples)?;
        accel[2] = remove_gravity(accel[2]);

        let mut gyro_bytes = [0u8; 6];
        for (axis, bias) in gyro.iter().enumerate() {
            gyro_bytes[axis * 2..axis * 2 + 2].copy_from_slice(&gyro_offset_bytes(*bias));
        }
        imu.write_gyro_offsets(&gyro_bytes)?;

        for (reg, bias) in [REG_XA_OFFSET_H, REG_YA_OFFSET_H, REG_ZA_OFFSET_H]
            .into_iter()
            .zip(accel)
        {
            let factory: [u8; 2] = imu.read_regs(reg)?;
            let [high, low] = accel_trim_bytes(factory, bias);
            imu.write_reg(reg, high)?;
            imu.write_reg(reg + 1, low)?;
        }

        let data = CalibrationData {
            gyro_bias: BiasVector::new(gyro, GYRO_CAL_SENSITIVITY),
            accel_bias: BiasVector::new(accel, ACCEL_CAL_SENSITIVITY),
            packets: accumulator.packets(),
        };
        self.data = Some(data);
        Ok(data)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset, quiesce the FIFO and force the calibration configuration
fn prepare_device<I2C, D, E>(imu: &mut Mpu6050<I2C, D>) -> Result<(), Error<E>>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u16>,
{
    imu.reset()?;

    imu.write_reg(REG_PWR_MGMT_1, PWR_CLOCK_PLL_XGYRO)?;
    imu.write_reg(REG_PWR_MGMT_2, 0x00)?;
    imu.settle(RESET_SETTLE_MS);

    imu.write_reg(REG_INT_ENABLE, 0x00)?;
    imu.write_reg(REG_FIFO_EN, 0x00)?;
    imu.write_reg(REG_PWR_MGMT_1, 0x00)?;
    imu.write_reg(REG_I2C_MST_CTRL, 0x00)?;
    imu.write_reg(REG_USER_CTRL, 0x00)?;
    imu.write_reg(REG_USER_CTRL, USER_CTRL_FIFO_DMP_RESET)?;
    imu.settle(FIFO_RESET_SETTLE_MS);

    // Maximum sensitivity regardless of the active-mode ranges
    imu.write_reg(REG_CONFIG, CONFIG_DLPF_188HZ)?;
    imu.write_reg(REG_SMPLRT_DIV, SMPLRT_DIV_1KHZ)?;
    imu.write_reg(REG_GYRO_CONFIG, FS_MAX_SENSITIVITY)?;
    imu.write_reg(REG_ACCEL_CONFIG, FS_MAX_SENSITIVITY)?;
    Ok(())
}

/// Capture one FIFO window and sum its packets
fn drain_fifo<I2C, D, E>(imu: &mut Mpu6050<I2C, D>) -> Result<BiasAccumulator, Error<E>>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u16>,
{
    imu.write_reg(REG_USER_CTRL, USER_CTRL_FIFO_EN)?;
    imu.write_reg(REG_FIFO_EN, FIFO_EN_GYRO_ACCEL)?;
    imu.settle(FIFO_ACCUMULATE_MS);
    imu.write_reg(REG_FIFO_EN, 0x00)?;

    let count: [u8; 2] = imu.read_regs(REG_FIFO_COUNTH)?;
    let packet_count = u16::from_be_bytes(count) as usize / FIFO_PACKET_SIZE;

    let mut accumulator = BiasAccumulator::new();
    for _ in 0..packet_count {
        let packet: [u8; FIFO_PACKET_SIZE] = imu.read_regs(REG_FIFO_R_W)?;
        accumulator.add_packet(&packet);
    }
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingDelay, FakeMpu};

    fn imu_with(fake: &FakeMpu) -> (Mpu6050<FakeMpu, CountingDelay>, CountingDelay) {
        let delay = CountingDelay::new();
        (Mpu6050::new(fake.clone(), delay.clone()), delay)
    }

    #[test]
    fn gravity_removal_follows_sign_of_average() {
        assert_eq!(remove_gravity(16400), 16);
        assert_eq!(remove_gravity(-16400), -16);
    }

    #[test]
    fn gravity_removal_treats_zero_as_positive_pole() {
        assert_eq!(remove_gravity(0), -16384);
    }

    #[test]
    fn gyro_offset_is_negated_quarter_counts() {
        let bytes = gyro_offset_bytes(400);
        assert_eq!(bytes[0], ((-400 / 4 >> 8) & 0xFF) as u8);
        assert_eq!(bytes[1], ((-400 / 4) & 0xFF) as u8);
        assert_eq!(bytes, [0xFF, 0x9C]);
        assert_eq!(i16::from_be_bytes(bytes), -100);
    }

    #[test]
    fn gyro_offset_truncates_toward_zero() {
        assert_eq!(i16::from_be_bytes(gyro_offset_bytes(-7)), 1);
        assert_eq!(i16::from_be_bytes(gyro_offset_bytes(3)), 0);
    }

    #[test]
    fn accel_trim_keeps_temperature_bit() {
        // factory trim 0x0101 = 257 with the TC bit set, bias of 80 counts
        let bytes = accel_trim_bytes([0x01, 0x01], 80);
        assert_eq!(bytes, [0x00, 0xF7]);

        // bit clear stays clear
        let bytes = accel_trim_bytes([0x01, 0x00], -16);
        assert_eq!(i16::from_be_bytes(bytes), 258);
    }

    #[test]
    fn averages_truncate_toward_zero() {
        let mut acc = BiasAccumulator::new();
        assert_eq!(acc.averages(), None);

        acc.add_packet(&FakeMpu::packet([1, -1, 100], [3, -3, 0]));
        acc.add_packet(&FakeMpu::packet([0, 0, 101], [4, -4, 0]));

        let (accel, gyro) = acc.averages().unwrap();
        assert_eq!(accel, [0, 0, 100]);
        assert_eq!(gyro, [3, -3, 0]);
        assert_eq!(acc.packets(), 2);
    }

    #[test]
    fn calibrate_writes_offsets_and_reports_bias() {
        let fake = FakeMpu::new();
        fake.set_reg_pair(REG_XA_OFFSET_H, [0x05, 0x01]);
        fake.set_reg_pair(REG_YA_OFFSET_H, [0x00, 0x00]);
        fake.set_reg_pair(REG_ZA_OFFSET_H, [0x00, 0x00]);
        for _ in 0..4 {
            fake.script_fifo_packet([80, -40, 16400], [400, -131, 8]);
        }
        let (mut imu, delay) = imu_with(&fake);
        let mut calibration = Calibration::new();

        let data = calibration.calibrate(&mut imu).unwrap();

        assert_eq!(data.packets, 4);
        assert_eq!(data.gyro_bias, BiasVector::new([400, -131, 8], 131));
        assert_eq!(data.accel_bias, BiasVector::new([80, -40, 16], 16384));
        assert_eq!(data.gyro_bias.to_units()[1], -1.0);

        assert_eq!(fake.reg_pair(REG_XG_OFFS_USRH), (-100i16).to_be_bytes());
        assert_eq!(fake.reg_pair(REG_YG_OFFS_USRH), 32i16.to_be_bytes());
        assert_eq!(fake.reg_pair(REG_ZG_OFFS_USRH), (-2i16).to_be_bytes());

        // 0x0501 - 80/8 = 0x04F7, TC bit restored
        assert_eq!(fake.reg_pair(REG_XA_OFFSET_H), [0x04, 0xF7]);
        assert_eq!(fake.reg_pair(REG_YA_OFFSET_H), 5i16.to_be_bytes());
        assert_eq!(fake.reg_pair(REG_ZA_OFFSET_H), (-2i16).to_be_bytes());

        assert!(delay.total_ms() >= 100 + 150 + 80);
        assert_eq!(calibration.gyro_bias(), Some(data.gyro_bias));
    }

    #[test]
    fn calibrate_forces_max_sensitivity() {
        let fake = FakeMpu::new();
        fake.set_reg(REG_GYRO_CONFIG, 0x18);
        fake.set_reg(REG_ACCEL_CONFIG, 0x18);
        fake.script_fifo_packet([0, 0, 16384], [0, 0, 0]);
        let (mut imu, _) = imu_with(&fake);

        Calibration::new().calibrate(&mut imu).unwrap();

        let writes = fake.writes();
        let reset = writes.iter().position(|w| *w == (REG_PWR_MGMT_1, 0x80)).unwrap();
        let fifo_on = writes.iter().position(|w| *w == (REG_FIFO_EN, 0x78)).unwrap();
        assert!(reset < fifo_on);
        assert!(writes[..fifo_on].contains(&(REG_GYRO_CONFIG, 0x00)));
        assert!(writes[..fifo_on].contains(&(REG_ACCEL_CONFIG, 0x00)));
        assert!(writes[..fifo_on].contains(&(REG_SMPLRT_DIV, 0x00)));
        assert!(writes[..fifo_on].contains(&(REG_CONFIG, 0x01)));
        assert_eq!(writes[fifo_on + 1], (REG_FIFO_EN, 0x00));
    }

    #[test]
    fn empty_fifo_is_insufficient_and_writes_no_offsets() {
        let fake = FakeMpu::new();
        let (mut imu, _) = imu_with(&fake);
        let mut calibration = Calibration::new();

        let result = calibration.calibrate(&mut imu);

        assert!(matches!(result, Err(Error::InsufficientSamples)));
        assert!(calibration.data().is_none());
        let offset_regs = REG_XA_OFFSET_H..=REG_ZG_OFFS_USRL;
        assert!(fake.writes().iter().all(|(reg, _)| !offset_regs.contains(reg)));
    }

    #[test]
    fn partial_packet_does_not_count() {
        let fake = FakeMpu::new();
        fake.script_fifo_bytes(&[0u8; 11]);
        let (mut imu, _) = imu_with(&fake);

        let result = Calibration::new().calibrate(&mut imu);
        assert!(matches!(result, Err(Error::InsufficientSamples)));
    }

    #[test]
    fn bus_error_aborts_calibration() {
        let fake = FakeMpu::new();
        fake.script_fifo_packet([0, 0, 16384], [10, 10, 10]);
        fake.fail_writes_to(REG_XG_OFFS_USRH);
        let (mut imu, _) = imu_with(&fake);

        let result = Calibration::new().calibrate(&mut imu);

        assert!(matches!(result, Err(Error::Bus(_))));
        assert!(fake.writes().iter().all(|(reg, _)| *reg != REG_XA_OFFSET_H));
    }
}
