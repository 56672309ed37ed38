//! Configuration constants for the gyro peripheral firmware

use crate::drivers::{AccelRange, GyroRange};

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// Radio co-processor UART baud rate
pub const UART_BAUD: u32 = 9600;

/// MPU-6050 7-bit bus address (AD0 low)
pub const MPU6050_ADDR: u8 = 0x68;

/// Value the WHO_AM_I register must report
pub const MPU6050_WHO_AM_I: u8 = 0x68;

/// Settle time after a device reset in milliseconds
pub const RESET_SETTLE_MS: u16 = 100;

/// Settle time after a FIFO and signal path reset in milliseconds
pub const FIFO_RESET_SETTLE_MS: u16 = 150;

/// FIFO accumulation window during calibration in milliseconds
pub const FIFO_ACCUMULATE_MS: u16 = 80;

/// Telemetry sampling period while connected
pub const SAMPLE_PERIOD_MS: u32 = 5000;

/// Advertising interval in milliseconds
pub const ADVERTISING_INTERVAL_MS: u16 = 40;

/// Length of one advertising window in milliseconds
pub const ADVERTISING_WINDOW_MS: u16 = 4000;

/// Delay before retrying a refused advertising start
pub const ADVERTISING_RETRY_MS: u32 = 1000;

/// Calibration runs attempted before startup gives up
pub const CALIBRATION_ATTEMPTS: u8 = 3;

/// Advertised device name
pub const DEVICE_NAME: &str = "Gyro & Peripheral Server";

/// Gyro service identifier
pub const GYRO_SERVICE_UUID: &str = "8c852eb9-8ec5-4ac0-a3eb-e9c375fbc756";

/// Per-axis field identifiers
pub const GYRO_X_UUID: &str = "90cb4365-2833-4541-a321-9437d9b38464";
pub const GYRO_Y_UUID: &str = "df49a77c-4fd8-4327-aa5f-1410bce0d0ff";
pub const GYRO_Z_UUID: &str = "a511aa3f-744e-4790-a225-8553838aa6ac";

/// Capacity of one formatted log line
pub const LOG_LINE_CAPACITY: usize = 96;

/// Largest client write payload accepted from the link (ATT MTU 23 minus header)
pub const MAX_WRITE_PAYLOAD: usize = 20;

/// How gyro bias is removed from telemetry.
///
/// Exactly one path is active so a bias is never corrected twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasCorrection {
    /// Offsets written by calibration stay in the device registers
    Hardware,
    /// Device offsets are zeroed and the sampler subtracts the measured bias
    Software,
}

/// Runtime configuration of the peripheral
#[derive(Debug, Clone, Copy)]
pub struct PeripheralConfig {
    pub gyro_range: GyroRange,
    pub accel_range: AccelRange,
    pub correction: BiasCorrection,
    pub sample_period_ms: u32,
    pub calibration_attempts: u8,
    pub advertising_retry_ms: u32,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            gyro_range: GyroRange::Dps250,
            accel_range: AccelRange::G2,
            correction: BiasCorrection::Hardware,
            sample_period_ms: SAMPLE_PERIOD_MS,
            calibration_attempts: CALIBRATION_ATTEMPTS,
            advertising_retry_ms: ADVERTISING_RETRY_MS,
        }
    }
}
