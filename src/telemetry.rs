//! Gyro telemetry sampling
//!
//! Turns raw gyro counts into the compact signed byte exposed per axis.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::drivers::calibration::CALIBRATION_GYRO_RANGE;
use crate::drivers::{BiasVector, Error, Mpu6050, SensorClass, SensorScales};

/// Lowest value a field can hold
pub const PUBLIC_MIN: i8 = -127;
/// Highest value a field can hold
pub const PUBLIC_MAX: i8 = 127;

const RAW_MIN: i32 = i16::MIN as i32;
const RAW_MAX: i32 = i16::MAX as i32;

/// Map a raw count linearly onto the public range, truncating
pub fn remap(raw: i16) -> i8 {
    let span_in = RAW_MAX - RAW_MIN;
    let span_out = PUBLIC_MAX as i32 - PUBLIC_MIN as i32;
    ((raw as i32 - RAW_MIN) * span_out / span_in + PUBLIC_MIN as i32) as i8
}

/// One value per axis, always within the public range
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFields {
    pub x: i8,
    pub y: i8,
    pub z: i8,
}

impl TelemetryFields {
    pub const fn new(x: i8, y: i8, z: i8) -> Self {
        Self { x, y, z }
    }

    pub const fn values(&self) -> [i8; 3] {
        [self.x, self.y, self.z]
    }
}

/// Per-tick gyro sampler
pub struct TelemetrySampler {
    scales: SensorScales,
    // Counts at the configured range, zero unless software correction is active
    bias: [i32; 3],
    fields: TelemetryFields,
}

impl TelemetrySampler {
    pub fn new(scales: SensorScales) -> Self {
        Self {
            scales,
            bias: [0; 3],
            fields: TelemetryFields::default(),
        }
    }

    pub fn scales(&self) -> SensorScales {
        self.scales
    }

    /// Subtract a calibration bias from every sample
    pub fn set_software_bias(&mut self, bias: &BiasVector) {
        self.bias = bias.rescale(CALIBRATION_GYRO_RANGE.full_scale(), self.scales.gyro);
    }

    pub fn software_bias(&self) -> [i32; 3] {
        self.bias
    }

    /// Last stored fields
    pub fn fields(&self) -> TelemetryFields {
        self.fields
    }

    /// Take one sample if the device has one ready.
    ///
    /// `WouldBlock` means no new data; the stored fields are left alone.
    pub fn sample_tick<I2C, D, E>(
        &mut self,
        imu: &mut Mpu6050<I2C, D>,
    ) -> nb::Result<TelemetryFields, Error<E>>
    where
        I2C: Write<Error = E> + WriteRead<Error = E>,
        D: DelayMs<u16>,
    {
        if !imu.data_ready()? {
            return Err(nb::Error::WouldBlock);
        }
        let raw = imu.read_axes(SensorClass::Gyro)?;

        let mut out = [0i8; 3];
        for ((value, count), bias) in out.iter_mut().zip(raw.axes()).zip(self.bias) {
            let corrected = (count as i32 - bias).clamp(RAW_MIN, RAW_MAX);
            *value = remap(corrected as i16);
        }
        self.fields = TelemetryFields::new(out[0], out[1], out[2]);
        Ok(self.fields)
    }
}
