//! [log] backend writing every record to the serial port.

use crate::{config, serial_println};
use log::{Level, Metadata, Record};

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= log::max_level()
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    let level = match record.level() {
      Level::Error => "ERROR",
      Level::Warn => "WARN ",
      Level::Info => "INFO ",
      Level::Debug => "DEBUG",
      Level::Trace => "TRACE",
    };
    serial_println!("[{}] {}: {}", level, record.target(), record.args());
  }

  fn flush(&self) {}
}

/// Install the serial logger. Calling it again is harmless.
pub fn init() {
  if log::set_logger(&LOGGER).is_ok() {
    log::set_max_level(config::LOG_LEVEL);
  }
}
