#![allow(clippy::missing_safety_doc)]

use avr_device::atmega128a::{USART0, USART1};
use avr_device::interrupt::Mutex;
use core::cell::RefCell;
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::serial;

use crate::config::{CPU_FREQ_HZ, UART_BAUD};

// Buffer size must be power of 2 for efficient masking
const BUFFER_SIZE: usize = 64;
const BUFFER_MASK: usize = BUFFER_SIZE - 1;

const UBRR: u16 = (CPU_FREQ_HZ / (16 * UART_BAUD) - 1) as u16;

const UDRE: u8 = 1 << 5;
const RXEN: u8 = 1 << 4;
const TXEN: u8 = 1 << 3;
const RXCIE: u8 = 1 << 7;
// 8 data bits, no parity, 1 stop bit
const FRAME_8N1: u8 = 0x06;

pub struct Buffer {
    data: [u8; BUFFER_SIZE],
    write_idx: usize,
    read_idx: usize,
}

impl Buffer {
    const fn new() -> Self {
        Self {
            data: [0; BUFFER_SIZE],
            write_idx: 0,
            read_idx: 0,
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        let next_write = (self.write_idx + 1) & BUFFER_MASK;
        if next_write != self.read_idx {
            self.data[self.write_idx] = byte;
            self.write_idx = next_write;
            true
        } else {
            false
        }
    }

    fn read(&mut self) -> Option<u8> {
        if self.read_idx != self.write_idx {
            let byte = self.data[self.read_idx];
            self.read_idx = (self.read_idx + 1) & BUFFER_MASK;
            Some(byte)
        } else {
            None
        }
    }
}

// Filled by the USART0 receive interrupt
static RX_BUFFER: Mutex<RefCell<Buffer>> = Mutex::new(RefCell::new(Buffer::new()));

pub struct Uart<USART> {
    _usart: PhantomData<USART>,
}

macro_rules! impl_uart {
    ($USART:ident, $udr:ident, $ucsra:ident, $ucsrb:ident, $ucsrc:ident, $ubrrh:ident, $ubrrl:ident, $rx_irq:expr) => {
        impl Uart<$USART> {
            pub fn new() -> Self {
                unsafe {
                    let p = $USART::ptr();
                    (*p).$ubrrh.write(|w| w.bits((UBRR >> 8) as u8));
                    (*p).$ubrrl.write(|w| w.bits(UBRR as u8));
                    (*p).$ucsrc.write(|w| w.bits(FRAME_8N1));
                    let rx = if $rx_irq { RXEN | RXCIE } else { 0 };
                    (*p).$ucsrb.write(|w| w.bits(TXEN | rx));
                }
                Self { _usart: PhantomData }
            }

            pub fn is_tx_ready(&self) -> bool {
                unsafe { (*$USART::ptr()).$ucsra.read().bits() & UDRE != 0 }
            }

            pub fn write_byte(&mut self, byte: u8) {
                while !self.is_tx_ready() {}
                unsafe { (*$USART::ptr()).$udr.write(|w| w.bits(byte)) };
            }

            pub fn write_str(&mut self, s: &str) {
                for byte in s.bytes() {
                    self.write_byte(byte);
                }
            }
        }

        impl serial::Write<u8> for Uart<$USART> {
            type Error = Infallible;

            fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
                if !self.is_tx_ready() {
                    return Err(nb::Error::WouldBlock);
                }
                unsafe { (*$USART::ptr()).$udr.write(|w| w.bits(word)) };
                Ok(())
            }

            fn flush(&mut self) -> nb::Result<(), Infallible> {
                if self.is_tx_ready() {
                    Ok(())
                } else {
                    Err(nb::Error::WouldBlock)
                }
            }
        }
    };
}

impl_uart!(USART0, udr0, ucsr0a, ucsr0b, ucsr0c, ubrr0h, ubrr0l, true);
impl_uart!(USART1, udr1, ucsr1a, ucsr1b, ucsr1c, ubrr1h, ubrr1l, false);

impl Uart<USART0> {
    pub fn read_byte(&mut self) -> Option<u8> {
        avr_device::interrupt::free(|cs| RX_BUFFER.borrow(cs).borrow_mut().read())
    }
}

impl serial::Read<u8> for Uart<USART0> {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.read_byte().ok_or(nb::Error::WouldBlock)
    }
}

#[avr_device::interrupt(atmega128a)]
fn USART0_RX() {
    unsafe {
        let byte = (*USART0::ptr()).udr0.read().bits();
        avr_device::interrupt::free(|cs| {
            RX_BUFFER.borrow(cs).borrow_mut().write(byte);
        });
    }
}
