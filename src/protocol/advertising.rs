//! Advertising payload and parameters

use heapless::Vec;

use super::{ProtocolError, Result};
use crate::config::{ADVERTISING_INTERVAL_MS, ADVERTISING_WINDOW_MS, DEVICE_NAME};

/// Legacy advertising payload limit
pub const MAX_AD_LEN: usize = 31;

// AD structure types
const AD_TYPE_FLAGS: u8 = 0x01;
const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

// Flags field bits
const FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;
const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// Length-type-value encoded advertising data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingData {
    bytes: Vec<u8, MAX_AD_LEN>,
}

impl AdvertisingData {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Discoverable flags followed by the device name.
    ///
    /// A name that does not fit is cut and sent as a shortened name.
    pub fn with_name(name: &str) -> Self {
        let mut data = Self::new();
        // Flags always fit in an empty payload
        let _ = data.push_field(
            AD_TYPE_FLAGS,
            &[FLAG_LE_GENERAL_DISCOVERABLE | FLAG_BR_EDR_NOT_SUPPORTED],
        );

        let room = data.remaining().saturating_sub(2);
        let name = name.as_bytes();
        if name.len() <= room {
            let _ = data.push_field(AD_TYPE_COMPLETE_NAME, name);
        } else {
            let _ = data.push_field(AD_TYPE_SHORT_NAME, &name[..room]);
        }
        data
    }

    /// Append one AD structure
    pub fn push_field(&mut self, ad_type: u8, value: &[u8]) -> Result<()> {
        if value.len() + 2 > self.remaining() {
            return Err(ProtocolError::BufferOverflow);
        }
        let _ = self.bytes.push(value.len() as u8 + 1);
        let _ = self.bytes.push(ad_type);
        let _ = self.bytes.extend_from_slice(value);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        MAX_AD_LEN - self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for AdvertisingData {
    fn default() -> Self {
        Self::new()
    }
}

/// Connectable undirected advertising setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParams {
    pub interval_ms: u16,
    /// Advertising stops after this long without a connection
    pub window_ms: u16,
    pub data: AdvertisingData,
}

impl AdvertisingParams {
    pub fn new(name: &str) -> Self {
        Self {
            interval_ms: ADVERTISING_INTERVAL_MS,
            window_ms: ADVERTISING_WINDOW_MS,
            data: AdvertisingData::with_name(name),
        }
    }

    /// Interval in 0.625 ms radio units
    pub fn interval_units(&self) -> u16 {
        (self.interval_ms as u32 * 8 / 5) as u16
    }

    /// Window in 10 ms radio units
    pub fn window_units(&self) -> u16 {
        self.window_ms / 10
    }
}

impl Default for AdvertisingParams {
    fn default() -> Self {
        Self::new(DEVICE_NAME)
    }
}
