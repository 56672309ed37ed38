#![no_std]
#![no_main]

use panic_halt as _;

use avr_device::atmega128a::{Peripherals, USART0};

use gyro_ble_firmware::drivers::{Mpu6050, SerialConsole};
use gyro_ble_firmware::hal::{Delay, SysTick, Twi, TwiSpeed, Uart};
use gyro_ble_firmware::protocol::transport::FramedLink;
use gyro_ble_firmware::{Peripheral, PeripheralConfig};

#[avr_device::entry]
fn main() -> ! {
    // Drivers below go through raw register blocks; holding the singleton
    // keeps anything else from claiming them
    let _dp = Peripherals::take();

    let clock = SysTick::start();
    let mut console = SerialConsole::new(clock);
    console.write_line("Gyro peripheral v0.1.0");

    let mut twi = Twi::new();
    twi.set_speed(TwiSpeed::Fast400k);
    let imu = Mpu6050::new(twi, Delay::new());
    let link = FramedLink::new(Uart::<USART0>::new());

    // Co-processor bytes and clock ticks are interrupt driven
    unsafe { avr_device::interrupt::enable() };

    let mut peripheral = Peripheral::new(imu, link, console, PeripheralConfig::default());
    // A failed bring-up is already logged and leaves the device idle
    let _ = peripheral.start_sensor();

    loop {
        peripheral.poll_link();
        peripheral.poll_timers(clock.now_ms());
    }
}
