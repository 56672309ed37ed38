pub mod calibration;
pub mod mpu6050;
#[cfg(target_arch = "avr")]
pub mod serial_console;

pub use calibration::{BiasVector, Calibration, CalibrationData};
pub use mpu6050::{
    AccelRange, Error, GyroRange, Mpu6050, RawSample, ScaleFactor, SensorClass, SensorScales,
};
#[cfg(target_arch = "avr")]
pub use serial_console::SerialConsole;
