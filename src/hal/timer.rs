use avr_device::atmega128a::{TC0, TC2};
use avr_device::interrupt::Mutex;
use core::marker::PhantomData;
use embedded_hal::blocking::delay::DelayMs;

use crate::os::SystemClock;

#[derive(Clone, Copy)]
pub enum Prescaler {
    Stop = 0,
    Direct = 1,
    Div8 = 2,
    Div32 = 3,
    Div64 = 4,
    Div128 = 5,
    Div256 = 6,
    Div1024 = 7,
}

const PRESCALER_MASK: u8 = 0x07;

/// 8-bit Timer0 in normal mode
pub struct Timer {
    _timer: PhantomData<TC0>,
}

impl Timer {
    pub fn new() -> Self {
        unsafe {
            let p = TC0::ptr();
            (*p).tccr0.write(|w| w.bits(0));
            (*p).tcnt0.write(|w| w.bits(0));
        }
        Self { _timer: PhantomData }
    }

    pub fn start(&mut self, prescaler: Prescaler) {
        unsafe {
            (*TC0::ptr()).tccr0.modify(|r, w| {
                w.bits((r.bits() & !PRESCALER_MASK) | (prescaler as u8 & PRESCALER_MASK))
            });
        }
    }

    pub fn stop(&mut self) {
        unsafe {
            (*TC0::ptr()).tccr0.modify(|r, w| w.bits(r.bits() & !PRESCALER_MASK));
        }
    }

    pub fn set_counter(&mut self, value: u8) {
        unsafe { (*TC0::ptr()).tcnt0.write(|w| w.bits(value)) };
    }

    pub fn get_counter(&self) -> u8 {
        unsafe { (*TC0::ptr()).tcnt0.read().bits() }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Busy-wait millisecond delay on Timer0
pub struct Delay {
    timer: Timer,
}

impl Delay {
    pub fn new() -> Self {
        Self { timer: Timer::new() }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayMs<u16> for Delay {
    fn delay_ms(&mut self, ms: u16) {
        // 16MHz/64 = 250kHz, 250 ticks = 1ms
        self.timer.set_counter(0);
        self.timer.start(Prescaler::Div64);

        for _ in 0..ms {
            while self.timer.get_counter() < 250 {}
            self.timer.set_counter(0);
        }

        self.timer.stop();
    }
}

// Timer2 CTC mode, clk/64
const TCCR2_CTC_DIV64: u8 = (1 << 3) | 0x03;
// 16MHz/64 = 250kHz, match on 249 every 1ms
const OCR2_1MS: u8 = 249;
const OCIE2: u8 = 1 << 7;

// Advanced by the Timer2 compare interrupt
static CLOCK: Mutex<SystemClock> = Mutex::new(SystemClock::new());

/// Millisecond time base on the Timer2 compare match
#[derive(Clone, Copy)]
pub struct SysTick {
    _timer: PhantomData<TC2>,
}

impl SysTick {
    /// Start ticking. Counts only once interrupts are enabled.
    pub fn start() -> Self {
        unsafe {
            let p = TC2::ptr();
            (*p).tcnt2.write(|w| w.bits(0));
            (*p).ocr2.write(|w| w.bits(OCR2_1MS));
            (*p).tccr2.write(|w| w.bits(TCCR2_CTC_DIV64));
            (*p).timsk.modify(|r, w| w.bits(r.bits() | OCIE2));
        }
        Self { _timer: PhantomData }
    }

    pub fn now_ms(&self) -> u32 {
        avr_device::interrupt::free(|cs| CLOCK.borrow(cs).now_ms())
    }
}

#[avr_device::interrupt(atmega128a)]
fn TIMER2_COMP() {
    avr_device::interrupt::free(|cs| CLOCK.borrow(cs).tick());
}
