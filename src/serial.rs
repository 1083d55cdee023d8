//! High level printing helpers to send info over the serial interface

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

use crate::x86_64::interrupts::execute_without_interrupts;

const COM1: u16 = 0x3F8;

lazy_static! {
    #[doc(hidden)]
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(COM1) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    // An interrupt handler that prints while SERIAL1 is locked on the same core would spin
    // forever, so the lock is only taken with interrupts off.
    execute_without_interrupts(|| {
        SERIAL1
            .lock()
            .write_fmt(args)
            .expect("Printing to serial failed");
    });
}

#[doc(hidden)]
pub const GREEN: &str = "\x1b[32m";
#[doc(hidden)]
pub const RED: &str = "\x1b[31m";
#[doc(hidden)]
pub const RESET: &str = "\x1b[0m";

/// Prints to the host through the serial interface.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*));
    };
}

/// Prints to the host through the serial interface, appending a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*));
}

/// Prints in green through the serial interface.
#[macro_export]
macro_rules! serial_success {
    ($($arg:tt)*) => {
        $crate::serial_print!(
            "{}{}{}",
            $crate::serial::GREEN,
            format_args!($($arg)*),
            $crate::serial::RESET
        );
    };
}

/// Prints in red through the serial interface.
#[macro_export]
macro_rules! serial_error {
    ($($arg:tt)*) => {
        $crate::serial_print!(
            "{}{}{}",
            $crate::serial::RED,
            format_args!($($arg)*),
            $crate::serial::RESET
        );
    };
}
