//! Peripheral lifecycle
//!
//! Brings the sensor up once, then cycles through advertising, connection and
//! periodic telemetry pushes. Events are handled one at a time by `dispatch`;
//! timer expiries arrive as events through `poll_timers`.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::config::{BiasCorrection, PeripheralConfig, DEVICE_NAME, MPU6050_WHO_AM_I};
use crate::diagnostics::*;
use crate::drivers::{Calibration, CalibrationData, Error, Mpu6050};
use crate::logger::LogSink;
use crate::protocol::gatt::GyroService;
use crate::protocol::{AdvertisingParams, AuthorizationReply, Axis, Link, LinkEvent, WriteRequest};
use crate::rtos::{Scheduler, SchedulerError, TimerTask};
use crate::telemetry::{TelemetryFields, TelemetrySampler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Advertising,
    Connected,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Link(LinkEvent),
    Timer(TimerTask),
    /// Release the link and stop handling events
    Stop,
}

/// The gyro peripheral
pub struct Peripheral<I2C, D, L, S> {
    imu: Mpu6050<I2C, D>,
    link: L,
    diag: Diagnostics<S>,
    config: PeripheralConfig,
    state: LifecycleState,
    service: GyroService,
    calibration: Calibration,
    sampler: Option<TelemetrySampler>,
    scheduler: Scheduler,
    advertising: AdvertisingParams,
    link_ready: bool,
    now_ms: u32,
}

impl<I2C, D, L, S, E> Peripheral<I2C, D, L, S>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u16>,
    L: Link,
    S: LogSink,
{
    pub fn new(imu: Mpu6050<I2C, D>, link: L, sink: S, config: PeripheralConfig) -> Self {
        Self {
            imu,
            link,
            diag: Diagnostics::new(sink),
            config,
            state: LifecycleState::Idle,
            service: GyroService::new(),
            calibration: Calibration::new(),
            sampler: None,
            scheduler: Scheduler::new(),
            advertising: AdvertisingParams::new(DEVICE_NAME),
            link_ready: false,
            now_ms: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Current field values
    pub fn fields(&self) -> TelemetryFields {
        self.service.values()
    }

    pub fn service(&self) -> &GyroService {
        &self.service
    }

    pub fn calibration(&self) -> Option<&CalibrationData> {
        self.calibration.data()
    }

    pub fn sampler(&self) -> Option<&TelemetrySampler> {
        self.sampler.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics<S> {
        &self.diag
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn sensor_ready(&self) -> bool {
        self.sampler.is_some()
    }

    /// Identify, reset, calibrate and configure the sensor.
    ///
    /// On failure the device stays idle and never advertises. Advertising
    /// starts here if the link already reported ready.
    pub fn start_sensor(&mut self) -> Result<(), Error<E>> {
        if self.state == LifecycleState::ShuttingDown {
            return Ok(());
        }

        let id = match self.imu.who_am_i() {
            Ok(id) => id,
            Err(e) => {
                diag_error!(self.diag, ErrorCode::SensorError, SUB_IDENTITY, "sensor not responding");
                return Err(e);
            }
        };
        if id != MPU6050_WHO_AM_I {
            diag_error!(self.diag, ErrorCode::SensorError, SUB_IDENTITY, "unexpected sensor id {}", id);
            return Err(Error::UnexpectedDevice(id));
        }

        if let Err(e) = self.imu.reset() {
            diag_error!(self.diag, ErrorCode::SensorError, SUB_RESET, "sensor reset failed");
            return Err(e);
        }

        let data = self.calibrate()?;
        diag_info!(
            self.diag,
            "gyro bias {} {} {} from {} packets",
            data.gyro_bias.counts[0],
            data.gyro_bias.counts[1],
            data.gyro_bias.counts[2],
            data.packets
        );

        let scales = match self.imu.configure(self.config.gyro_range, self.config.accel_range) {
            Ok(scales) => scales,
            Err(e) => {
                diag_error!(self.diag, ErrorCode::SensorError, SUB_CONFIGURE, "sensor configure failed");
                return Err(e);
            }
        };

        let mut sampler = TelemetrySampler::new(scales);
        if self.config.correction == BiasCorrection::Software {
            if let Err(e) = self.imu.clear_gyro_offsets() {
                diag_error!(self.diag, ErrorCode::SensorError, SUB_OFFSETS, "clearing gyro offsets failed");
                return Err(e);
            }
            sampler.set_software_bias(&data.gyro_bias);
        }
        self.sampler = Some(sampler);
        diag_info!(self.diag, "sensor ready, range {} dps", scales.gyro.full_scale());

        if self.link_ready && self.state == LifecycleState::Idle {
            self.start_advertising();
        }
        Ok(())
    }

    fn calibrate(&mut self) -> Result<CalibrationData, Error<E>> {
        let attempts = self.config.calibration_attempts.max(1);
        for attempt in 1..=attempts {
            match self.calibration.calibrate(&mut self.imu) {
                Ok(data) => return Ok(data),
                Err(Error::InsufficientSamples) => {
                    diag_warn!(self.diag, "calibration {}/{} collected no samples", attempt, attempts);
                }
                Err(e) => {
                    diag_error!(
                        self.diag,
                        ErrorCode::CalibrationError,
                        SUB_CALIBRATION_BUS,
                        "calibration bus error"
                    );
                    return Err(e);
                }
            }
        }
        diag_error!(self.diag, ErrorCode::CalibrationError, SUB_NO_SAMPLES, "calibration failed");
        Err(Error::InsufficientSamples)
    }

    /// Handle exactly one event
    pub fn dispatch(&mut self, event: Event) {
        if self.state == LifecycleState::ShuttingDown {
            return;
        }
        match event {
            Event::Link(event) => self.on_link_event(event),
            Event::Timer(TimerTask::SampleGyro) => self.on_sample_tick(),
            Event::Timer(TimerTask::RestartAdvertising) => {
                if self.state == LifecycleState::Advertising {
                    self.start_advertising();
                }
            }
            Event::Stop => self.shutdown(),
        }
    }

    /// Drain pending link events
    pub fn poll_link(&mut self) {
        while self.state != LifecycleState::ShuttingDown {
            match self.link.poll_event() {
                Ok(event) => self.dispatch(Event::Link(event)),
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    diag_error!(
                        self.diag,
                        ErrorCode::CommunicationError,
                        SUB_LINK_POLL,
                        "dropped malformed link event"
                    );
                    break;
                }
            }
        }
    }

    /// Fire every timer due at `now_ms`
    pub fn poll_timers(&mut self, now_ms: u32) {
        self.now_ms = now_ms;
        while let Some(task) = self.scheduler.poll(now_ms) {
            self.dispatch(Event::Timer(task));
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Ready => {
                if self.link.register_service(&self.service).is_err() {
                    diag_error!(
                        self.diag,
                        ErrorCode::CommunicationError,
                        SUB_REGISTER,
                        "service registration failed"
                    );
                    return;
                }
                self.link_ready = true;
                if self.sensor_ready() && self.state == LifecycleState::Idle {
                    self.start_advertising();
                }
            }
            LinkEvent::Connected => {
                if self.state != LifecycleState::Advertising {
                    diag_warn!(self.diag, "connection while not advertising");
                    return;
                }
                self.state = LifecycleState::Connected;
                self.scheduler.cancel(TimerTask::RestartAdvertising);
                let armed = self.scheduler.schedule_periodic(
                    TimerTask::SampleGyro,
                    self.now_ms,
                    self.config.sample_period_ms,
                );
                self.arm(armed);
                diag_info!(self.diag, "connected");
            }
            LinkEvent::ConnectionFailed | LinkEvent::AdvertisingEnded => {
                if self.state == LifecycleState::Advertising {
                    self.start_advertising();
                }
            }
            LinkEvent::Disconnected => {
                self.scheduler.cancel(TimerTask::SampleGyro);
                self.service.clear_subscriptions();
                diag_info!(self.diag, "disconnected");
                if self.sensor_ready() {
                    self.start_advertising();
                }
            }
            LinkEvent::UpdatesEnabled(axis) => {
                self.service.set_subscribed(axis, true);
                diag_info!(self.diag, "updates on for {}", axis.label());
            }
            LinkEvent::UpdatesDisabled(axis) => {
                self.service.set_subscribed(axis, false);
                diag_info!(self.diag, "updates off for {}", axis.label());
            }
            LinkEvent::DataRead(axis) => {
                diag_info!(self.diag, "{} read: {}", axis.label(), self.service.field(axis).value());
            }
            LinkEvent::DataSent(_axis) => {
                #[cfg(feature = "debug")]
                diag_info!(self.diag, "{} sent", _axis.label());
            }
            LinkEvent::WriteRequest(request) => self.on_write_request(request),
        }
    }

    fn on_write_request(&mut self, request: WriteRequest) {
        let axis = request.axis;
        let reply: AuthorizationReply = self
            .service
            .authorize_write(axis, request.offset, request.len)
            .into();

        if self.link.reply_authorization(axis, reply).is_err() {
            diag_error!(
                self.diag,
                ErrorCode::CommunicationError,
                SUB_AUTHORIZE,
                "authorization reply for {} failed",
                axis.label()
            );
        }
        match reply {
            AuthorizationReply::Accept => {
                diag_info!(self.diag, "write to {} accepted, {} bytes", axis.label(), request.len);
            }
            AuthorizationReply::Reject(_) => {
                diag_warn!(
                    self.diag,
                    "write to {} rejected, status {}",
                    axis.label(),
                    reply.status()
                );
            }
        }
    }

    fn on_sample_tick(&mut self) {
        if self.state != LifecycleState::Connected {
            return;
        }
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };

        let fields = match sampler.sample_tick(&mut self.imu) {
            Ok(fields) => fields,
            Err(nb::Error::WouldBlock) => {
                #[cfg(feature = "debug")]
                diag_info!(self.diag, "no new gyro sample");
                return;
            }
            Err(nb::Error::Other(_)) => {
                diag_error!(self.diag, ErrorCode::SensorError, SUB_SAMPLE, "gyro read failed");
                return;
            }
        };

        self.service.update(fields);
        #[cfg(feature = "debug")]
        diag_info!(self.diag, "gyro {} {} {}", fields.x, fields.y, fields.z);

        for (axis, value) in Axis::ALL.into_iter().zip(fields.values()) {
            if self.link.notify(axis, value).is_ok() {
                continue;
            }
            if self.service.field(axis).is_subscribed() {
                diag_error!(
                    self.diag,
                    ErrorCode::CommunicationError,
                    SUB_NOTIFY,
                    "notify {} failed",
                    axis.label()
                );
            } else {
                diag_warn!(self.diag, "notify {} failed, not subscribed", axis.label());
            }
        }
    }

    fn start_advertising(&mut self) {
        self.state = LifecycleState::Advertising;
        match self.link.start_advertising(&self.advertising) {
            Ok(()) => {
                self.scheduler.cancel(TimerTask::RestartAdvertising);
                diag_info!(self.diag, "advertising");
            }
            Err(_) => {
                diag_error!(
                    self.diag,
                    ErrorCode::CommunicationError,
                    SUB_ADVERTISE,
                    "advertising start refused, retry in {} ms",
                    self.config.advertising_retry_ms
                );
                let armed = self.scheduler.schedule_once(
                    TimerTask::RestartAdvertising,
                    self.now_ms,
                    self.config.advertising_retry_ms,
                );
                self.arm(armed);
            }
        }
    }

    fn arm(&mut self, result: Result<(), SchedulerError>) {
        if result.is_err() {
            diag_error!(self.diag, ErrorCode::TimingError, SUB_TIMER_TABLE_FULL, "timer table full");
        }
    }

    fn shutdown(&mut self) {
        self.state = LifecycleState::ShuttingDown;
        self.scheduler.clear();
        if self.link.shutdown().is_err() {
            diag_error!(self.diag, ErrorCode::CommunicationError, SUB_SHUTDOWN, "link shutdown failed");
        }
        diag_info!(self.diag, "shut down");
    }
}
