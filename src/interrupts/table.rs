//! The vector-indexed handler table the trampolines call through.

use super::frame::RegisterFrame;
use super::trampoline::VECTOR_COUNT;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use x86_64::instructions::interrupts;

/// A kernel interrupt handler. It may rewrite any field of the frame.
pub type InterruptHandler = extern "C" fn(&mut RegisterFrame);

/// One table entry. Trampolines load the handler pointer straight out of
/// it, so it must stay a bare function pointer in memory.
#[repr(transparent)]
struct Slot(UnsafeCell<InterruptHandler>);

/// 256 handler slots, each holding a registered handler or
/// [unhandled_interrupt].
pub struct InterruptTable {
  slots: [Slot; VECTOR_COUNT],
  writer: Mutex<()>,
}

// SAFETY: slots are written only under `writer` with interrupts masked,
// and every access is a volatile pointer-sized read or write
unsafe impl Sync for InterruptTable {}

/// The kernel's single handler table.
pub static INTERRUPT_TABLE: InterruptTable = InterruptTable::new();

static UNHANDLED_COUNT: AtomicU64 = AtomicU64::new(0);
static LAST_UNHANDLED: AtomicU64 = AtomicU64::new(u64::MAX);

impl InterruptTable {
  const fn new() -> Self {
    const DEFAULT: Slot = Slot(UnsafeCell::new(unhandled_interrupt));
    InterruptTable {
      slots: [DEFAULT; VECTOR_COUNT],
      writer: Mutex::new(()),
    }
  }

  /// Install `handler` for `vector`, replacing whatever was there.
  pub fn set_handler(&self, vector: u8, handler: InterruptHandler) {
    self.write(vector, handler);
    log::debug!("handler for vector {:#x} registered", vector);
  }

  /// Put `vector` back to the default unhandled handler.
  pub fn reset_handler(&self, vector: u8) {
    self.write(vector, unhandled_interrupt);
  }

  fn write(&self, vector: u8, handler: InterruptHandler) {
    interrupts::without_interrupts(|| {
      let _guard = self.writer.lock();
      unsafe { self.slots[vector as usize].0.get().write_volatile(handler) };
    });
  }

  /// The handler currently installed for `vector`.
  pub fn handler(&self, vector: u8) -> InterruptHandler {
    unsafe { self.slots[vector as usize].0.get().read_volatile() }
  }

  /// Whether `vector` still holds the default handler.
  pub fn is_unhandled(&self, vector: u8) -> bool {
    self.handler(vector) as usize == unhandled_interrupt as usize
  }

  /// Address of the slot for `vector`, patched into its trampoline.
  pub fn slot_address(&self, vector: u8) -> u64 {
    self.slots[vector as usize].0.get() as u64
  }

  /// Run the handler for `frame.vector`, the way a trampoline would.
  pub fn dispatch(&self, frame: &mut RegisterFrame) {
    (self.handler(frame.vector as u8))(frame)
  }
}

/// Number of interrupts that reached no registered handler.
pub fn unhandled_count() -> u64 {
  UNHANDLED_COUNT.load(Ordering::Relaxed)
}

/// Vector of the last interrupt that reached no registered handler.
pub fn last_unhandled_vector() -> Option<u8> {
  u8::try_from(LAST_UNHANDLED.load(Ordering::Relaxed)).ok()
}

/// Default handler of every slot. An interrupt nobody claimed means the
/// kernel lost track of its hardware, so this records the vector and
/// panics.
pub extern "C" fn unhandled_interrupt(frame: &mut RegisterFrame) {
  UNHANDLED_COUNT.fetch_add(1, Ordering::Relaxed);
  LAST_UNHANDLED.store(frame.vector, Ordering::Relaxed);
  log::error!("unhandled interrupt {:#x}\n{:#x?}", frame.vector, frame);
  panic!(
    "unhandled interrupt {:#x} (error code {:#x}) at {:#x}",
    frame.vector, frame.error_code, frame.rip
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  static SEEN: AtomicU64 = AtomicU64::new(0);

  extern "C" fn record(frame: &mut RegisterFrame) {
    SEEN.store(frame.vector, Ordering::SeqCst);
    frame.rax = 0x1234;
  }

  #[test_case]
  fn test_unregistered_vectors_default() {
    for vector in [0x42u8, 0x90, 0xfe] {
      assert!(INTERRUPT_TABLE.is_unhandled(vector));
    }
    assert!(!INTERRUPT_TABLE.is_unhandled(0x80));
  }

  #[test_case]
  fn test_set_and_reset_handler() {
    let mut frame = RegisterFrame {
      vector: 0x61,
      ..RegisterFrame::default()
    };
    INTERRUPT_TABLE.set_handler(0x61, record);
    INTERRUPT_TABLE.dispatch(&mut frame);
    assert_eq!(SEEN.load(Ordering::SeqCst), 0x61);
    assert_eq!(frame.rax, 0x1234);

    INTERRUPT_TABLE.reset_handler(0x61);
    assert!(INTERRUPT_TABLE.is_unhandled(0x61));
  }

  #[test_case]
  fn test_slots_are_contiguous_pointers() {
    let first = INTERRUPT_TABLE.slot_address(0);
    assert_eq!(INTERRUPT_TABLE.slot_address(255), first + 255 * 8);
  }
}
