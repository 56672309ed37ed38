//! Framed link to a radio co-processor over a serial port

use embedded_hal::serial;
use heapless::Vec;

use super::packet::{Frame, FrameDecoder, MAX_PAYLOAD};
use super::{
    AdvertisingParams, AuthorizationReply, Axis, Command, EventCode, GyroService, Link,
    LinkEvent, ProtocolError, Result, WriteRequest,
};

// Axis, UUID, properties
const FIELD_ENTRY_SIZE: usize = 18;

/// Frame counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u32,
    pub frames_received: u32,
    pub frame_errors: u32,
}

/// `Link` over any byte-oriented serial port
pub struct FramedLink<S> {
    serial: S,
    decoder: FrameDecoder,
    stats: LinkStats,
}

impl<S, E> FramedLink<S>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
{
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            decoder: FrameDecoder::new(),
            stats: LinkStats::default(),
        }
    }

    pub fn release(self) -> S {
        self.serial
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn send(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(command as u8, payload)?;
        for &byte in frame.encode().iter() {
            nb::block!(self.serial.write(byte)).map_err(|_| ProtocolError::TransportError)?;
        }
        nb::block!(self.serial.flush()).map_err(|_| ProtocolError::TransportError)?;
        self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1);
        Ok(())
    }
}

fn axis_at(payload: &[u8], index: usize) -> Result<Axis> {
    payload
        .get(index)
        .copied()
        .and_then(Axis::from_u8)
        .ok_or(ProtocolError::InvalidPacket)
}

/// Translate an event frame
pub fn decode_event(frame: &Frame) -> Result<LinkEvent> {
    let code = EventCode::from_u8(frame.code()).ok_or(ProtocolError::InvalidCommand)?;
    let payload = frame.payload();

    let event = match code {
        EventCode::Ready => LinkEvent::Ready,
        EventCode::Connected => LinkEvent::Connected,
        EventCode::ConnectionFailed => LinkEvent::ConnectionFailed,
        EventCode::Disconnected => LinkEvent::Disconnected,
        EventCode::AdvertisingEnded => LinkEvent::AdvertisingEnded,
        EventCode::UpdatesEnabled => LinkEvent::UpdatesEnabled(axis_at(payload, 0)?),
        EventCode::UpdatesDisabled => LinkEvent::UpdatesDisabled(axis_at(payload, 0)?),
        EventCode::DataRead => LinkEvent::DataRead(axis_at(payload, 0)?),
        EventCode::DataSent => LinkEvent::DataSent(axis_at(payload, 0)?),
        EventCode::WriteRequest => {
            if payload.len() < 3 {
                return Err(ProtocolError::InvalidPacket);
            }
            LinkEvent::WriteRequest(WriteRequest::new(
                axis_at(payload, 0)?,
                u16::from_le_bytes([payload[1], payload[2]]),
                &payload[3..],
            ))
        }
    };
    Ok(event)
}

impl<S, E> Link for FramedLink<S>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
{
    type Error = ProtocolError;

    fn poll_event(&mut self) -> nb::Result<LinkEvent, ProtocolError> {
        loop {
            let byte = match self.serial.read() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
                Err(nb::Error::Other(_)) => {
                    self.decoder.reset();
                    return Err(nb::Error::Other(ProtocolError::TransportError));
                }
            };
            if let Some(result) = self.decoder.push(byte) {
                let event = result.and_then(|frame| decode_event(&frame));
                match event {
                    Ok(_) => self.stats.frames_received = self.stats.frames_received.wrapping_add(1),
                    Err(_) => self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1),
                }
                return event.map_err(nb::Error::Other);
            }
        }
    }

    fn register_service(&mut self, service: &GyroService) -> Result<()> {
        self.send(Command::RegisterService, service.uuid().as_bytes())?;
        for axis in Axis::ALL {
            let field = service.field(axis);
            let mut entry = [0u8; FIELD_ENTRY_SIZE];
            entry[0] = axis as u8;
            entry[1..17].copy_from_slice(field.uuid().as_bytes());
            entry[17] = field.properties().bits();
            self.send(Command::AddField, &entry)?;
        }
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<()> {
        let mut payload: Vec<u8, MAX_PAYLOAD> = Vec::new();
        payload
            .extend_from_slice(&params.interval_units().to_le_bytes())
            .and_then(|_| payload.extend_from_slice(&params.window_units().to_le_bytes()))
            .and_then(|_| payload.extend_from_slice(params.data.as_bytes()))
            .map_err(|_| ProtocolError::BufferOverflow)?;
        self.send(Command::StartAdvertising, &payload)
    }

    fn notify(&mut self, axis: Axis, value: i8) -> Result<()> {
        self.send(Command::Notify, &[axis as u8, value as u8])
    }

    fn reply_authorization(&mut self, axis: Axis, reply: AuthorizationReply) -> Result<()> {
        self.send(Command::AuthorizationReply, &[axis as u8, reply.status()])
    }

    fn shutdown(&mut self) -> Result<()> {
        self.send(Command::Shutdown, &[])
    }
}
