//! Interrupt entry for every vector.
//!
//! Each of the 256 IDT gates points at a generated [trampoline], which
//! saves a [RegisterFrame] and calls the handler stored in the
//! [INTERRUPT_TABLE] slot for its vector.

pub mod frame;
pub mod handlers;
pub mod idt;
pub mod table;
pub mod trampoline;

pub use frame::RegisterFrame;
pub use handlers::PICS;
pub use table::{InterruptHandler, INTERRUPT_TABLE};

use crate::config::SYSCALL_VECTOR;
use crate::gdt::{DOUBLE_FAULT_IST_INDEX, KERNEL_CODE_SELECTOR};
use conquer_once::spin::OnceCell;
use idt::{EntryOptions, Idt};
use trampoline::{TrampolineError, VECTOR_COUNT};
use x86_64::structures::gdt::SegmentSelector;

const BREAKPOINT_VECTOR: u8 = 3;
const DOUBLE_FAULT_VECTOR: u8 = 8;

static IDT: OnceCell<Idt> = OnceCell::uninit();

/// Generate the trampolines, register the exception and IRQ handlers and
/// load an IDT routing every vector through its trampoline.
pub fn init() -> Result<(), TrampolineError> {
  let entries = trampoline::generate()?;
  handlers::install(&INTERRUPT_TABLE);

  IDT
    .try_init_once(|| build_idt(entries))
    .map_err(|_| TrampolineError::AlreadyGenerated)?;
  if let Some(idt) = IDT.get() {
    idt.load();
  }
  log::info!("idt loaded, {} gates", VECTOR_COUNT);
  Ok(())
}

/// The loaded IDT.
pub fn idt() -> Option<&'static Idt> {
  IDT.get()
}

fn build_idt(entries: &[u64; VECTOR_COUNT]) -> Idt {
  let code_selector = SegmentSelector(KERNEL_CODE_SELECTOR);
  let mut idt = Idt::new();
  for (vector, &entry) in entries.iter().enumerate() {
    let vector = vector as u8;
    let mut options = EntryOptions::new();
    match vector {
      BREAKPOINT_VECTOR | SYSCALL_VECTOR => {
        options.set_privilege_level(3);
      }
      DOUBLE_FAULT_VECTOR => {
        options.set_stack_index(DOUBLE_FAULT_IST_INDEX + 1);
      }
      _ => {}
    }
    idt.set_gate(vector, code_selector, entry, options);
  }
  idt
}
