//! Co-processor frame codec
//!
//! Frame layout: `0x55 0xAA code len payload[len] checksum 0x0A`. The
//! checksum is the bitwise NOT of the wrapping sum of every byte before it.

use heapless::Vec;

use super::{ProtocolError, Result};

pub const START_BYTES: [u8; 2] = [0x55, 0xAA];
pub const END_BYTE: u8 = 0x0A;

const HEADER_SIZE: usize = 4;
const FOOTER_SIZE: usize = 2;

pub const MAX_PAYLOAD: usize = 40;
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD + FOOTER_SIZE;

pub fn checksum(data: &[u8]) -> u8 {
    let mut sum: u8 = 0;
    for &byte in data {
        sum = sum.wrapping_add(byte);
    }
    !sum
}

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    code: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    pub fn new(code: u8, payload: &[u8]) -> Result<Self> {
        let payload = Vec::from_slice(payload).map_err(|_| ProtocolError::BufferOverflow)?;
        Ok(Self { code, payload })
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize including header, checksum and end byte
    pub fn encode(&self) -> Vec<u8, MAX_FRAME_SIZE> {
        let mut out = Vec::new();
        // Payload is bounded by MAX_PAYLOAD, so every push fits
        let _ = out.extend_from_slice(&START_BYTES);
        let _ = out.push(self.code);
        let _ = out.push(self.payload.len() as u8);
        let _ = out.extend_from_slice(&self.payload);
        let sum = checksum(&out);
        let _ = out.push(sum);
        let _ = out.push(END_BYTE);
        out
    }

    /// Parse one complete frame
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(ProtocolError::InvalidPacket);
        }
        if data[..2] != START_BYTES {
            return Err(ProtocolError::InvalidPacket);
        }

        let length = data[3] as usize;
        if data.len() != HEADER_SIZE + length + FOOTER_SIZE {
            return Err(ProtocolError::InvalidPacket);
        }
        if data[HEADER_SIZE + length + 1] != END_BYTE {
            return Err(ProtocolError::InvalidPacket);
        }
        if data[HEADER_SIZE + length] != checksum(&data[..HEADER_SIZE + length]) {
            return Err(ProtocolError::InvalidChecksum);
        }

        Self::new(data[2], &data[HEADER_SIZE..HEADER_SIZE + length])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Start,
    Sync,
    Code,
    Length,
    Payload,
    Checksum,
    End,
}

/// Byte-at-a-time frame decoder.
///
/// Bytes outside a frame are skipped until the next start sequence.
pub struct FrameDecoder {
    state: DecodeState,
    code: u8,
    length: usize,
    payload: Vec<u8, MAX_PAYLOAD>,
    checksum_ok: bool,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: DecodeState::Start,
            code: 0,
            length: 0,
            payload: Vec::new(),
            checksum_ok: false,
        }
    }

    pub fn reset(&mut self) {
        self.state = DecodeState::Start;
        self.payload.clear();
    }

    /// Feed one byte; yields a result once a frame ends
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame>> {
        match self.state {
            DecodeState::Start => {
                if byte == START_BYTES[0] {
                    self.state = DecodeState::Sync;
                }
            }
            DecodeState::Sync => {
                self.state = match byte {
                    b if b == START_BYTES[1] => DecodeState::Code,
                    b if b == START_BYTES[0] => DecodeState::Sync,
                    _ => DecodeState::Start,
                };
            }
            DecodeState::Code => {
                self.code = byte;
                self.state = DecodeState::Length;
            }
            DecodeState::Length => {
                if byte as usize > MAX_PAYLOAD {
                    self.reset();
                    return Some(Err(ProtocolError::BufferOverflow));
                }
                self.length = byte as usize;
                self.payload.clear();
                self.state = if self.length == 0 {
                    DecodeState::Checksum
                } else {
                    DecodeState::Payload
                };
            }
            DecodeState::Payload => {
                let _ = self.payload.push(byte);
                if self.payload.len() == self.length {
                    self.state = DecodeState::Checksum;
                }
            }
            DecodeState::Checksum => {
                let header_sum = START_BYTES[0]
                    .wrapping_add(START_BYTES[1])
                    .wrapping_add(self.code)
                    .wrapping_add(self.length as u8);
                self.checksum_ok = byte == !header_sum.wrapping_add(self.payload_sum());
                self.state = DecodeState::End;
            }
            DecodeState::End => {
                let result = if byte != END_BYTE {
                    Err(ProtocolError::InvalidPacket)
                } else if !self.checksum_ok {
                    Err(ProtocolError::InvalidChecksum)
                } else {
                    Frame::new(self.code, &self.payload)
                };
                self.reset();
                return Some(result);
            }
        }
        None
    }

    fn payload_sum(&self) -> u8 {
        self.payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
