//! COM1 serial port, the kernel's only console.

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

/// I/O port base of the first serial port.
const COM1: u16 = 0x3F8;

lazy_static! {
  /// The first serial port, initialized on first use.
  pub static ref SERIAL1: Mutex<SerialPort> = {
    let mut serial_port = unsafe { SerialPort::new(COM1) };
    serial_port.init();
    Mutex::new(serial_port)
  };
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
  use core::fmt::Write;
  use x86_64::instructions::interrupts;

  // an interrupt handler that logs must never find the port locked by
  // the code it interrupted
  interrupts::without_interrupts(|| {
    // writes to the UART cannot fail
    let _ = SERIAL1.lock().write_fmt(args);
  });
}

/// Send raw bytes to the serial port, used by the `write` system call.
pub fn write_bytes(bytes: &[u8]) {
  use x86_64::instructions::interrupts;

  interrupts::without_interrupts(|| {
    let mut port = SERIAL1.lock();
    for &byte in bytes {
      port.send(byte);
    }
  });
}

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
