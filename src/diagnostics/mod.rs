//! Error reporting and diagnostics

use crate::logger::{LogLevel, LogSink};

/// Failure families; the low 12 bits carry the subcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SensorError = 0x2000,
    CommunicationError = 0x3000,
    CalibrationError = 0x4000,
    TimingError = 0x5000,
}

// Sensor subcodes
pub const SUB_IDENTITY: u16 = 0x001;
pub const SUB_CONFIGURE: u16 = 0x002;
pub const SUB_SAMPLE: u16 = 0x003;
pub const SUB_RESET: u16 = 0x004;
pub const SUB_OFFSETS: u16 = 0x005;

// Calibration subcodes
pub const SUB_NO_SAMPLES: u16 = 0x001;
pub const SUB_CALIBRATION_BUS: u16 = 0x002;

// Communication subcodes
pub const SUB_ADVERTISE: u16 = 0x001;
pub const SUB_NOTIFY: u16 = 0x002;
pub const SUB_AUTHORIZE: u16 = 0x003;
pub const SUB_SHUTDOWN: u16 = 0x004;
pub const SUB_LINK_POLL: u16 = 0x005;
pub const SUB_REGISTER: u16 = 0x006;

// Timing subcodes
pub const SUB_TIMER_TABLE_FULL: u16 = 0x001;

/// A recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub code: ErrorCode,
    pub subcode: u16,
}

impl Fault {
    /// Combined numeric code, family | subcode
    pub const fn value(&self) -> u16 {
        self.code as u16 | (self.subcode & 0x0FFF)
    }
}

/// Counts and forwards diagnostics to a log sink
pub struct Diagnostics<S> {
    sink: S,
    errors: u32,
    warnings: u32,
    last_error: Option<Fault>,
}

impl<S: LogSink> Diagnostics<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            errors: 0,
            warnings: 0,
            last_error: None,
        }
    }

    pub fn info(&mut self, message: &str) {
        self.sink.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.warnings = self.warnings.wrapping_add(1);
        self.sink.log(LogLevel::Warning, message);
    }

    pub fn report_error(&mut self, code: ErrorCode, subcode: u16, message: &str) {
        self.errors = self.errors.wrapping_add(1);
        self.last_error = Some(Fault { code, subcode });
        self.sink.log(LogLevel::Error, message);
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }

    pub fn last_error(&self) -> Option<Fault> {
        self.last_error
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Format into a bounded line and log at info level
#[macro_export]
macro_rules! diag_info {
    ($diag:expr, $($arg:tt)+) => {{
        let mut line: $crate::logger::LogLine<{ $crate::config::LOG_LINE_CAPACITY }> =
            $crate::logger::LogLine::new();
        let _ = ufmt::uwrite!(line, $($arg)+);
        $diag.info(line.as_str());
    }};
}

/// Format into a bounded line and log a warning
#[macro_export]
macro_rules! diag_warn {
    ($diag:expr, $($arg:tt)+) => {{
        let mut line: $crate::logger::LogLine<{ $crate::config::LOG_LINE_CAPACITY }> =
            $crate::logger::LogLine::new();
        let _ = ufmt::uwrite!(line, $($arg)+);
        $diag.warn(line.as_str());
    }};
}

/// Format into a bounded line and record an error with its code
#[macro_export]
macro_rules! diag_error {
    ($diag:expr, $code:expr, $subcode:expr, $($arg:tt)+) => {{
        let mut line: $crate::logger::LogLine<{ $crate::config::LOG_LINE_CAPACITY }> =
            $crate::logger::LogLine::new();
        let _ = ufmt::uwrite!(line, $($arg)+);
        $diag.report_error($code, $subcode, line.as_str());
    }};
}
