pub mod bus;

#[cfg(target_arch = "avr")]
pub mod timer;
#[cfg(target_arch = "avr")]
pub mod twi;
#[cfg(target_arch = "avr")]
pub mod uart;

// Re-export commonly used types
pub use bus::RegisterBus;

#[cfg(target_arch = "avr")]
pub use timer::{Delay, Prescaler, SysTick, Timer};
#[cfg(target_arch = "avr")]
pub use twi::{Twi, TwiError, TwiSpeed};
#[cfg(target_arch = "avr")]
pub use uart::Uart;
