//! Handlers for CPU exceptions and PIC interrupts.

use super::frame::RegisterFrame;
use super::table::InterruptTable;
use crate::config::{PIC_1_OFFSET, PIC_2_OFFSET};
use crate::thread::{self, ThreadId};
use core::sync::atomic::{AtomicU64, Ordering};
use pic8259::ChainedPics;
use x86_64::instructions::port::Port;

/// Vector of the PIT timer after remapping.
pub const TIMER_VECTOR: u8 = PIC_1_OFFSET;

/// The chained 8259 PICs, remapped past the exception vectors.
pub static PICS: spin::Mutex<ChainedPics> =
  spin::Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Timer interrupts seen since boot.
pub fn ticks() -> u64 {
  TICKS.load(Ordering::Relaxed)
}

pub(super) fn install(table: &InterruptTable) {
  table.set_handler(0, divide_error);
  table.set_handler(3, breakpoint);
  table.set_handler(6, invalid_opcode);
  table.set_handler(8, double_fault);
  table.set_handler(13, general_protection);
  table.set_handler(14, page_fault);
  table.set_handler(18, machine_check);

  table.set_handler(TIMER_VECTOR, timer);
  for vector in TIMER_VECTOR + 1..PIC_2_OFFSET + 8 {
    table.set_handler(vector, acknowledge_irq);
  }
}

/// Terminate the faulting thread, or panic when the fault hit the
/// bootstrap thread or came before threads exist.
fn fail_thread(frame: &RegisterFrame, what: &str) {
  match thread::current_id() {
    Some(id) if id != ThreadId::BOOTSTRAP => {
      log::error!(
        "{} in thread {} at {:#x} (error code {:#x}), terminating it",
        what,
        id,
        frame.rip,
        frame.error_code
      );
      thread::exit(thread::FAULT_EXIT_VALUE)
    }
    _ => panic!("EXCEPTION: {}\n{:#x?}", what, frame),
  }
}

extern "C" fn divide_error(frame: &mut RegisterFrame) {
  fail_thread(frame, "DIVIDE ERROR");
}

extern "C" fn breakpoint(frame: &mut RegisterFrame) {
  log::info!("EXCEPTION: BREAKPOINT at {:#x}", frame.rip);
}

extern "C" fn invalid_opcode(frame: &mut RegisterFrame) {
  fail_thread(frame, "INVALID OPCODE");
}

extern "C" fn double_fault(frame: &mut RegisterFrame) {
  panic!("EXCEPTION: DOUBLE FAULT\n{:#x?}", frame);
}

extern "C" fn general_protection(frame: &mut RegisterFrame) {
  fail_thread(frame, "GENERAL PROTECTION FAULT");
}

extern "C" fn page_fault(frame: &mut RegisterFrame) {
  use x86_64::registers::control::Cr2;

  log::error!("page fault accessing {:#x}", Cr2::read().as_u64());
  fail_thread(frame, "PAGE FAULT");
}

extern "C" fn machine_check(frame: &mut RegisterFrame) {
  panic!("EXCEPTION: MACHINE CHECK\n{:#x?}", frame);
}

extern "C" fn timer(frame: &mut RegisterFrame) {
  TICKS.fetch_add(1, Ordering::Relaxed);
  unsafe {
    PICS.lock().notify_end_of_interrupt(frame.vector as u8);
  }
  // the next thread may run for a while, so the EOI goes out first
  thread::scheduler::preempt();
}

const PIC_1_COMMAND: u16 = 0x20;
const PIC_2_COMMAND: u16 = 0xa0;
/// OCW3: the next command-port read returns the in-service register.
const OCW3_READ_ISR: u8 = 0x0b;
/// IRQ line each PIC reports when the request vanished before the ack.
const SPURIOUS_LINE: u8 = 7;

static SPURIOUS: AtomicU64 = AtomicU64::new(0);

/// Spurious PIC interrupts seen since boot.
pub fn spurious_count() -> u64 {
  SPURIOUS.load(Ordering::Relaxed)
}

/// Which end-of-interrupt an IRQ needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eoi {
  /// A real interrupt: the PIC(s) that delivered it.
  Full,
  /// Spurious IRQ 15: only the master saw a real cascade request.
  MasterOnly,
  /// Spurious IRQ 7: nothing is in service.
  Skip,
}

/// Decide the EOI for `irq` from the in-service registers of both PICs.
fn eoi_for(irq: u8, master_isr: u8, slave_isr: u8) -> Eoi {
  let line_bit = 1 << SPURIOUS_LINE;
  match irq {
    7 if master_isr & line_bit == 0 => Eoi::Skip,
    15 if slave_isr & line_bit == 0 => Eoi::MasterOnly,
    _ => Eoi::Full,
  }
}

fn read_isr(command: u16) -> u8 {
  let mut port = Port::<u8>::new(command);
  unsafe {
    port.write(OCW3_READ_ISR);
    port.read()
  }
}

/// Device IRQs without a driver. Spurious IRQs 7 and 15 are recognized
/// from the in-service registers and never acknowledge a real request.
extern "C" fn acknowledge_irq(frame: &mut RegisterFrame) {
  let irq = frame.vector as u8 - PIC_1_OFFSET;
  let mut pics = PICS.lock();
  let eoi = match irq {
    7 | 15 => eoi_for(irq, read_isr(PIC_1_COMMAND), read_isr(PIC_2_COMMAND)),
    _ => Eoi::Full,
  };
  match eoi {
    Eoi::Full => unsafe { pics.notify_end_of_interrupt(frame.vector as u8) },
    // any master vector makes the EOI go to the master alone
    Eoi::MasterOnly => unsafe { pics.notify_end_of_interrupt(PIC_1_OFFSET) },
    Eoi::Skip => {}
  }
  drop(pics);
  if eoi != Eoi::Full {
    SPURIOUS.fetch_add(1, Ordering::Relaxed);
  }
  log::trace!("irq {} acknowledged ({:?})", irq, eoi);
}
