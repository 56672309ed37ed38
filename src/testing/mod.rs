//! Host-side test doubles
//!
//! Handles are cheap clones over shared state so a test can keep one copy
//! while the code under test owns another.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::config::{MPU6050_ADDR, MPU6050_WHO_AM_I};
use crate::drivers::mpu6050::*;
use crate::logger::{LogLevel, LogSink};
use crate::protocol::{
    AdvertisingParams, AuthorizationReply, Axis, GyroService, Link, LinkEvent, ProtocolError,
};

/// Bus failure raised by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBusError {
    Nack,
    Injected,
}

#[derive(Default)]
struct MpuState {
    regs: Vec<u8>,
    fifo: VecDeque<u8>,
    scripted: Vec<u8>,
    writes: Vec<(u8, u8)>,
    reads: Vec<u8>,
    fail_write_to: Option<u8>,
    fail_reads: bool,
}

/// Register-file model of the MPU-6050.
///
/// Scripted FIFO bytes land in the FIFO once FIFO_EN is switched on; a FIFO
/// reset through USER_CTRL empties it. Reading INT_STATUS clears it.
#[derive(Clone)]
pub struct FakeMpu {
    state: Rc<RefCell<MpuState>>,
}

impl FakeMpu {
    pub fn new() -> Self {
        let mut state = MpuState {
            regs: vec![0; 128],
            ..Default::default()
        };
        state.regs[REG_WHO_AM_I as usize] = MPU6050_WHO_AM_I;
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Encode one FIFO packet, accel then gyro
    pub fn packet(accel: [i16; 3], gyro: [i16; 3]) -> [u8; 12] {
        let mut out = [0u8; 12];
        for (i, v) in accel.iter().chain(gyro.iter()).enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&v.to_be_bytes());
        }
        out
    }

    pub fn script_fifo_packet(&self, accel: [i16; 3], gyro: [i16; 3]) {
        self.script_fifo_bytes(&Self::packet(accel, gyro));
    }

    pub fn script_fifo_bytes(&self, bytes: &[u8]) {
        self.state.borrow_mut().scripted.extend_from_slice(bytes);
    }

    pub fn set_reg(&self, reg: u8, value: u8) {
        self.state.borrow_mut().regs[reg as usize] = value;
    }

    pub fn reg(&self, reg: u8) -> u8 {
        self.state.borrow().regs[reg as usize]
    }

    pub fn set_reg_pair(&self, reg: u8, value: [u8; 2]) {
        self.set_reg(reg, value[0]);
        self.set_reg(reg + 1, value[1]);
    }

    pub fn reg_pair(&self, reg: u8) -> [u8; 2] {
        [self.reg(reg), self.reg(reg + 1)]
    }

    pub fn set_gyro_output(&self, sample: RawSample) {
        for (i, v) in sample.axes().iter().enumerate() {
            self.set_reg_pair(REG_GYRO_XOUT_H + (i as u8) * 2, v.to_be_bytes());
        }
    }

    pub fn set_data_ready(&self, ready: bool) {
        self.set_reg(REG_INT_STATUS, if ready { INT_DATA_READY } else { 0 });
    }

    /// Every register write so far, in order
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state.borrow().writes.clone()
    }

    /// Number of reads that started at `reg`
    pub fn reads_of(&self, reg: u8) -> usize {
        self.state.borrow().reads.iter().filter(|r| **r == reg).count()
    }

    pub fn fail_writes_to(&self, reg: u8) {
        self.state.borrow_mut().fail_write_to = Some(reg);
    }

    pub fn fail_reads(&self) {
        self.state.borrow_mut().fail_reads = true;
    }
}

impl Write for FakeMpu {
    type Error = FakeBusError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), FakeBusError> {
        if address != MPU6050_ADDR {
            return Err(FakeBusError::Nack);
        }
        let mut state = self.state.borrow_mut();
        let Some((&first, values)) = bytes.split_first() else {
            return Ok(());
        };
        for (i, &value) in values.iter().enumerate() {
            let reg = first + i as u8;
            if state.fail_write_to == Some(reg) {
                return Err(FakeBusError::Injected);
            }
            state.writes.push((reg, value));
            state.regs[reg as usize] = value;

            if reg == REG_USER_CTRL && value & 0x04 != 0 {
                state.fifo.clear();
            }
            if reg == REG_FIFO_EN && value != 0 {
                let scripted: Vec<u8> = state.scripted.drain(..).collect();
                state.fifo.extend(scripted);
            }
        }
        Ok(())
    }
}

impl WriteRead for FakeMpu {
    type Error = FakeBusError;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), FakeBusError> {
        if address != MPU6050_ADDR {
            return Err(FakeBusError::Nack);
        }
        let mut state = self.state.borrow_mut();
        if state.fail_reads {
            return Err(FakeBusError::Injected);
        }
        let reg = bytes.first().copied().unwrap_or(0);
        state.reads.push(reg);

        match reg {
            REG_FIFO_COUNTH => {
                let count = (state.fifo.len() as u16).to_be_bytes();
                for (out, b) in buffer.iter_mut().zip(count) {
                    *out = b;
                }
            }
            REG_FIFO_R_W => {
                for out in buffer.iter_mut() {
                    *out = state.fifo.pop_front().unwrap_or(0);
                }
            }
            _ => {
                for (i, out) in buffer.iter_mut().enumerate() {
                    *out = state.regs[reg as usize + i];
                }
                if reg == REG_INT_STATUS {
                    state.regs[REG_INT_STATUS as usize] = 0;
                }
            }
        }
        Ok(())
    }
}

/// Delay that only adds up the requested time
#[derive(Clone, Default)]
pub struct CountingDelay {
    total: Rc<Cell<u32>>,
}

impl CountingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ms(&self) -> u32 {
        self.total.get()
    }
}

impl DelayMs<u16> for CountingDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.total.set(self.total.get() + ms as u32);
    }
}

/// Log sink keeping every line
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Rc<RefCell<Vec<(LogLevel, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines.borrow().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lines.borrow().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|(_, m)| m.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn log(&mut self, level: LogLevel, message: &str) {
        self.lines.borrow_mut().push((level, message.to_string()));
    }
}

/// A call made on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCall {
    StartAdvertising { interval_ms: u16, window_ms: u16 },
    RegisterService,
    Notify(Axis, i8),
    Reply(Axis, AuthorizationReply),
    Shutdown,
}

#[derive(Default)]
struct LinkState {
    calls: Vec<LinkCall>,
    events: VecDeque<LinkEvent>,
    advertising_failures: u32,
    fail_notify: bool,
    fail_register: bool,
}

/// Link double recording calls and replaying queued events
#[derive(Clone, Default)]
pub struct RecordingLink {
    state: Rc<RefCell<LinkState>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: LinkEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn advertising_starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LinkCall::StartAdvertising { .. }))
            .count()
    }

    pub fn notifications(&self) -> Vec<(Axis, i8)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                LinkCall::Notify(axis, value) => Some((*axis, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<(Axis, AuthorizationReply)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                LinkCall::Reply(axis, reply) => Some((*axis, *reply)),
                _ => None,
            })
            .collect()
    }

    /// Refuse the next `count` advertising starts
    pub fn fail_advertising(&self, count: u32) {
        self.state.borrow_mut().advertising_failures = count;
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.state.borrow_mut().fail_notify = fail;
    }

    pub fn fail_registration(&self, fail: bool) {
        self.state.borrow_mut().fail_register = fail;
    }
}

impl Link for RecordingLink {
    type Error = ProtocolError;

    fn poll_event(&mut self) -> nb::Result<LinkEvent, ProtocolError> {
        self.state
            .borrow_mut()
            .events
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }

    fn register_service(&mut self, _service: &GyroService) -> Result<(), ProtocolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LinkCall::RegisterService);
        if state.fail_register {
            return Err(ProtocolError::TransportError);
        }
        Ok(())
    }

    fn start_advertising(&mut self, params: &AdvertisingParams) -> Result<(), ProtocolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LinkCall::StartAdvertising {
            interval_ms: params.interval_ms,
            window_ms: params.window_ms,
        });
        if state.advertising_failures > 0 {
            state.advertising_failures -= 1;
            return Err(ProtocolError::TransportError);
        }
        Ok(())
    }

    fn notify(&mut self, axis: Axis, value: i8) -> Result<(), ProtocolError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(LinkCall::Notify(axis, value));
        if state.fail_notify {
            return Err(ProtocolError::TransportError);
        }
        Ok(())
    }

    fn reply_authorization(
        &mut self,
        axis: Axis,
        reply: AuthorizationReply,
    ) -> Result<(), ProtocolError> {
        self.state.borrow_mut().calls.push(LinkCall::Reply(axis, reply));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.state.borrow_mut().calls.push(LinkCall::Shutdown);
        Ok(())
    }
}
