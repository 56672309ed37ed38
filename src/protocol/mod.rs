//! Wireless link protocol stack
//!
//! The radio co-processor owns the BLE link layer. This module describes what
//! the peripheral needs from it (`Link`), the GATT service it exposes, and the
//! framed UART protocol used to drive a co-processor.

pub mod advertising;
pub mod gatt;
pub mod packet;
pub mod transport;

use heapless::Vec;

use crate::config::MAX_WRITE_PAYLOAD;
pub use advertising::{AdvertisingData, AdvertisingParams};
pub use gatt::{AuthorizationError, AuthorizationReply, GyroService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    BufferOverflow,
    InvalidChecksum,
    InvalidPacket,
    InvalidCommand,
    TransportError,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

/// Requests sent to the co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartAdvertising = 0x10,
    Notify = 0x11,
    AuthorizationReply = 0x12,
    Shutdown = 0x13,
    RegisterService = 0x14,
    AddField = 0x15,
}

/// Event codes reported by the co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    Ready = 0x80,
    Connected = 0x81,
    ConnectionFailed = 0x82,
    Disconnected = 0x83,
    AdvertisingEnded = 0x84,
    UpdatesEnabled = 0x85,
    UpdatesDisabled = 0x86,
    DataRead = 0x87,
    WriteRequest = 0x88,
    DataSent = 0x89,
}

impl EventCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x80 => Some(EventCode::Ready),
            0x81 => Some(EventCode::Connected),
            0x82 => Some(EventCode::ConnectionFailed),
            0x83 => Some(EventCode::Disconnected),
            0x84 => Some(EventCode::AdvertisingEnded),
            0x85 => Some(EventCode::UpdatesEnabled),
            0x86 => Some(EventCode::UpdatesDisabled),
            0x87 => Some(EventCode::DataRead),
            0x88 => Some(EventCode::WriteRequest),
            0x89 => Some(EventCode::DataSent),
            _ => None,
        }
    }
}

/// Gyro axis, one exposed field each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

/// Client write awaiting an authorization reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub axis: Axis,
    pub offset: u16,
    /// Length the client sent, which may exceed what `data` holds
    pub len: usize,
    /// Leading bytes of the write, truncated to capacity
    pub data: Vec<u8, MAX_WRITE_PAYLOAD>,
}

impl WriteRequest {
    pub fn new(axis: Axis, offset: u16, bytes: &[u8]) -> Self {
        let kept = &bytes[..bytes.len().min(MAX_WRITE_PAYLOAD)];
        let mut data = Vec::new();
        // `kept` never exceeds the capacity
        let _ = data.extend_from_slice(kept);
        Self {
            axis,
            offset,
            len: bytes.len(),
            data,
        }
    }
}

/// Link layer notifications, delivered one at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Radio stack is up and accepts commands
    Ready,
    Connected,
    ConnectionFailed,
    Disconnected,
    /// Advertising window expired without a connection
    AdvertisingEnded,
    UpdatesEnabled(Axis),
    UpdatesDisabled(Axis),
    DataRead(Axis),
    DataSent(Axis),
    WriteRequest(WriteRequest),
}

/// Wireless link collaborator
pub trait Link {
    type Error;

    /// Next pending event, `WouldBlock` when there is none
    fn poll_event(&mut self) -> nb::Result<LinkEvent, Self::Error>;

    /// Publish the service and its field table
    fn register_service(
        &mut self,
        service: &GyroService,
    ) -> core::result::Result<(), Self::Error>;

    /// Become discoverable and connectable for one advertising window
    fn start_advertising(
        &mut self,
        params: &AdvertisingParams,
    ) -> core::result::Result<(), Self::Error>;

    /// Push one field value to the client
    fn notify(&mut self, axis: Axis, value: i8) -> core::result::Result<(), Self::Error>;

    /// Answer a pending write request
    fn reply_authorization(
        &mut self,
        axis: Axis,
        reply: AuthorizationReply,
    ) -> core::result::Result<(), Self::Error>;

    /// Tear the link down
    fn shutdown(&mut self) -> core::result::Result<(), Self::Error>;
}
