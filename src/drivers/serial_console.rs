use crate::hal::{SysTick, Uart};
use crate::logger::{line_prefix, LogLevel, LogSink};
use avr_device::atmega128a::USART1;

/// Diagnostics console on the second USART.
///
/// Every log line carries the uptime in milliseconds.
pub struct SerialConsole {
    uart: Uart<USART1>,
    clock: SysTick,
}

impl SerialConsole {
    pub fn new(clock: SysTick) -> Self {
        Self {
            uart: Uart::new(),
            clock,
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.uart.write_str(s);
    }

    pub fn write_line(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }
}

impl LogSink for SerialConsole {
    fn log(&mut self, level: LogLevel, message: &str) {
        let prefix = line_prefix(level, self.clock.now_ms());
        self.write_str(prefix.as_str());
        self.write_line(message);
    }
}
