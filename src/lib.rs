//! Gyro telemetry BLE peripheral firmware
//!
//! An MPU-6050 is calibrated at startup and its gyro readings are exposed as
//! three one-byte GATT fields, pushed to a connected client on a fixed period
//! through a radio co-processor.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

pub mod config;
#[macro_use]
pub mod diagnostics;
pub mod logger;

pub mod drivers;
pub mod hal;
pub mod os;
pub mod protocol;
pub mod rtos;
pub mod telemetry;

pub mod application;

#[cfg(test)]
pub(crate) mod testing;

pub use application::{Event, LifecycleState, Peripheral};
pub use config::{BiasCorrection, PeripheralConfig};
