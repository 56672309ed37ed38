//! Log sink abstraction and bounded log line buffer

use core::convert::Infallible;

use heapless::String;
use ufmt::{uWrite, uwrite};

/// Room for a level tag and a full `u32` uptime
pub const PREFIX_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info = 0,
    Warning = 1,
    Error = 2,
}

impl LogLevel {
    /// Short tag printed ahead of a message
    pub const fn tag(self) -> &'static str {
        match self {
            LogLevel::Info => "[I] ",
            LogLevel::Warning => "[W] ",
            LogLevel::Error => "[E] ",
        }
    }
}

/// Line prefix: level tag, then uptime in milliseconds
pub fn line_prefix(level: LogLevel, uptime_ms: u32) -> LogLine<PREFIX_CAPACITY> {
    let mut prefix = LogLine::new();
    let _ = uwrite!(prefix, "{}({})\t", level.tag(), uptime_ms);
    prefix
}

/// Fire-and-forget diagnostics output
pub trait LogSink {
    fn log(&mut self, level: LogLevel, message: &str);
}

impl<T: LogSink + ?Sized> LogSink for &mut T {
    fn log(&mut self, level: LogLevel, message: &str) {
        (**self).log(level, message)
    }
}

/// Fixed-capacity formatting target.
///
/// Text past the capacity is dropped; the line is marked truncated and
/// formatting never fails.
pub struct LogLine<const N: usize> {
    text: String<N>,
    truncated: bool,
}

impl<const N: usize> LogLine<N> {
    pub const fn new() -> Self {
        Self {
            text: String::new(),
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.truncated = false;
    }
}

impl<const N: usize> Default for LogLine<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> uWrite for LogLine<N> {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        if self.truncated {
            return Ok(());
        }
        if self.text.push_str(s).is_err() {
            // Keep whole characters only
            for c in s.chars() {
                if self.text.push(c).is_err() {
                    break;
                }
            }
            self.truncated = true;
        }
        Ok(())
    }
}
