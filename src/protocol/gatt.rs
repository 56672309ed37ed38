//! GATT service model for the gyro fields

use bitflags::bitflags;

use super::Axis;
use crate::config::{GYRO_SERVICE_UUID, GYRO_X_UUID, GYRO_Y_UUID, GYRO_Z_UUID};
use crate::telemetry::TelemetryFields;

/// Width in bytes of one field value
pub const FIELD_WIDTH: usize = 1;

/// 128-bit UUID, stored in big-endian textual order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uuid128([u8; 16]);

impl Uuid128 {
    /// Parse the canonical `8-4-4-4-12` hex form
    pub const fn parse(text: &str) -> Option<Self> {
        let s = text.as_bytes();
        if s.len() != 36 {
            return None;
        }
        let mut bytes = [0u8; 16];
        let mut i = 0;
        let mut n = 0;
        while i < s.len() {
            if s[i] == b'-' {
                if !(i == 8 || i == 13 || i == 18 || i == 23) {
                    return None;
                }
                i += 1;
                continue;
            }
            if n == bytes.len() || i + 1 >= s.len() {
                return None;
            }
            let (hi, lo) = match (hex_value(s[i]), hex_value(s[i + 1])) {
                (Some(hi), Some(lo)) => (hi, lo),
                _ => return None,
            };
            bytes[n] = (hi << 4) | lo;
            n += 1;
            i += 2;
        }
        if n != 16 {
            return None;
        }
        Some(Self(bytes))
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

const fn uuid(text: &str) -> Uuid128 {
    match Uuid128::parse(text) {
        Some(uuid) => uuid,
        None => panic!("malformed UUID constant"),
    }
}

pub const SERVICE_UUID: Uuid128 = uuid(GYRO_SERVICE_UUID);
pub const FIELD_UUIDS: [Uuid128; 3] = [uuid(GYRO_X_UUID), uuid(GYRO_Y_UUID), uuid(GYRO_Z_UUID)];

bitflags! {
    /// Characteristic properties, ATT bit values
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Properties: u8 {
        const READ = 0x02;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
    }
}

/// Reason a client write is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationError {
    InvalidOffset,
    InvalidLength,
    WriteNotPermitted,
}

/// Answer to a write request as sent over the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationReply {
    Accept,
    Reject(AuthorizationError),
}

impl AuthorizationReply {
    /// ATT status code carried by the reply
    pub const fn status(self) -> u8 {
        match self {
            AuthorizationReply::Accept => 0x00,
            AuthorizationReply::Reject(AuthorizationError::WriteNotPermitted) => 0x03,
            AuthorizationReply::Reject(AuthorizationError::InvalidOffset) => 0x07,
            AuthorizationReply::Reject(AuthorizationError::InvalidLength) => 0x0D,
        }
    }

    pub const fn from_status(status: u8) -> Option<Self> {
        match status {
            0x00 => Some(AuthorizationReply::Accept),
            0x03 => Some(AuthorizationReply::Reject(AuthorizationError::WriteNotPermitted)),
            0x07 => Some(AuthorizationReply::Reject(AuthorizationError::InvalidOffset)),
            0x0D => Some(AuthorizationReply::Reject(AuthorizationError::InvalidLength)),
            _ => None,
        }
    }
}

impl From<Result<(), AuthorizationError>> for AuthorizationReply {
    fn from(result: Result<(), AuthorizationError>) -> Self {
        match result {
            Ok(()) => AuthorizationReply::Accept,
            Err(e) => AuthorizationReply::Reject(e),
        }
    }
}

/// One exposed one-byte field
#[derive(Debug, Clone, Copy)]
pub struct Field {
    uuid: Uuid128,
    properties: Properties,
    value: i8,
    subscribed: bool,
}

impl Field {
    pub const fn new(uuid: Uuid128, properties: Properties) -> Self {
        Self {
            uuid,
            properties,
            value: 0,
            subscribed: false,
        }
    }

    pub const fn uuid(&self) -> Uuid128 {
        self.uuid
    }

    pub const fn properties(&self) -> Properties {
        self.properties
    }

    pub const fn value(&self) -> i8 {
        self.value
    }

    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Validate a client write of `len` bytes. Never touches the value.
    pub fn authorize_write(&self, offset: u16, len: usize) -> Result<(), AuthorizationError> {
        if !self.properties.contains(Properties::WRITE) {
            return Err(AuthorizationError::WriteNotPermitted);
        }
        if offset != 0 {
            return Err(AuthorizationError::InvalidOffset);
        }
        if len != FIELD_WIDTH {
            return Err(AuthorizationError::InvalidLength);
        }
        Ok(())
    }
}

/// The gyro service: one field per axis
pub struct GyroService {
    fields: [Field; 3],
}

impl GyroService {
    pub const PROPERTIES: Properties = Properties::READ
        .union(Properties::WRITE)
        .union(Properties::NOTIFY);

    pub const fn new() -> Self {
        Self {
            fields: [
                Field::new(FIELD_UUIDS[0], Self::PROPERTIES),
                Field::new(FIELD_UUIDS[1], Self::PROPERTIES),
                Field::new(FIELD_UUIDS[2], Self::PROPERTIES),
            ],
        }
    }

    pub const fn uuid(&self) -> Uuid128 {
        SERVICE_UUID
    }

    pub fn field(&self, axis: Axis) -> &Field {
        &self.fields[axis.index()]
    }

    /// Store a fresh sample in all three fields
    pub fn update(&mut self, sample: TelemetryFields) {
        for (field, value) in self.fields.iter_mut().zip(sample.values()) {
            field.value = value;
        }
    }

    pub fn values(&self) -> TelemetryFields {
        TelemetryFields::new(self.fields[0].value, self.fields[1].value, self.fields[2].value)
    }

    pub fn set_subscribed(&mut self, axis: Axis, subscribed: bool) {
        self.fields[axis.index()].subscribed = subscribed;
    }

    pub fn clear_subscriptions(&mut self) {
        for field in self.fields.iter_mut() {
            field.subscribed = false;
        }
    }

    pub fn authorize_write(
        &self,
        axis: Axis,
        offset: u16,
        len: usize,
    ) -> Result<(), AuthorizationError> {
        self.field(axis).authorize_write(offset, len)
    }
}

impl Default for GyroService {
    fn default() -> Self {
        Self::new()
    }
}
