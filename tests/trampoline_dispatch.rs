//! Every vector reaches its handler through its own trampoline, and the
//! interrupted context comes back exactly as the handler left the frame.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(gate_os::test_harness::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::{entry_point, BootInfo};
use core::arch::asm;
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU64, Ordering};

use gate_os::gdt::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
use gate_os::interrupts::{self, trampoline, RegisterFrame, INTERRUPT_TABLE};
use gate_os::test_harness::{exit_qemu, init_or_fail, test_panic_handler, QemuExitCode};

entry_point!(test_kernel_main);

fn test_kernel_main(boot_info: &'static BootInfo) -> ! {
  init_or_fail(boot_info);
  test_main();
  exit_qemu(QemuExitCode::Success);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
  test_panic_handler(info)
}

static LAST_VECTOR: AtomicU64 = AtomicU64::new(0);
static LAST_CS: AtomicU64 = AtomicU64::new(0);
static LAST_DS: AtomicU64 = AtomicU64::new(0);
static LAST_ERROR_CODE: AtomicU64 = AtomicU64::new(u64::MAX);
static CALLS: AtomicU64 = AtomicU64::new(0);

extern "C" fn record(frame: &mut RegisterFrame) {
  LAST_VECTOR.store(frame.vector, Ordering::SeqCst);
  LAST_CS.store(frame.cs, Ordering::SeqCst);
  LAST_DS.store(frame.ds, Ordering::SeqCst);
  LAST_ERROR_CODE.store(frame.error_code, Ordering::SeqCst);
  CALLS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn answer(frame: &mut RegisterFrame) {
  frame.rax = 0x1234;
  frame.rcx = frame.rcx.wrapping_add(1);
}

extern "C" fn quiet(_: &mut RegisterFrame) {}

#[test_case]
fn test_every_copy_is_patched() {
  let layout = trampoline::layout().expect("trampolines generated");
  let idt = interrupts::idt().expect("idt loaded");
  let mut previous = None;
  for vector in 0..=255u8 {
    let code = trampoline::stamped(vector).expect("trampolines generated");
    assert_eq!(layout.patched_vector(code), u32::from(vector));
    assert_eq!(layout.patched_slot(code), INTERRUPT_TABLE.slot_address(vector));

    let base = code.as_ptr() as u64;
    let skip = if trampoline::pushes_error_code(vector) {
      layout.common_offset as u64
    } else {
      0
    };
    let entry = trampoline::entry(vector).expect("trampolines generated");
    assert_eq!(entry, base + skip);
    assert_eq!(idt.gate(vector).0, entry);
    if let Some(previous) = previous {
      assert_eq!(base - previous, layout.len as u64);
    }
    previous = Some(base);
  }
}

#[test_case]
fn test_software_interrupts_reach_their_handler() {
  for vector in [0x42u8, 0x50, 0xff] {
    INTERRUPT_TABLE.set_handler(vector, record);
  }
  let before = CALLS.load(Ordering::SeqCst);

  unsafe { asm!("int {v}", v = const 0x42) };
  assert_eq!(LAST_VECTOR.load(Ordering::SeqCst), 0x42);
  unsafe { asm!("int {v}", v = const 0x50) };
  assert_eq!(LAST_VECTOR.load(Ordering::SeqCst), 0x50);
  unsafe { asm!("int {v}", v = const 0xff) };
  assert_eq!(LAST_VECTOR.load(Ordering::SeqCst), 0xff);

  assert_eq!(CALLS.load(Ordering::SeqCst), before + 3);
  assert_eq!(LAST_ERROR_CODE.load(Ordering::SeqCst), 0);
  assert_eq!(LAST_CS.load(Ordering::SeqCst), u64::from(KERNEL_CODE_SELECTOR));
  assert_eq!(LAST_DS.load(Ordering::SeqCst), u64::from(KERNEL_DATA_SELECTOR));

  for vector in [0x42u8, 0x50, 0xff] {
    INTERRUPT_TABLE.reset_handler(vector);
    assert!(INTERRUPT_TABLE.is_unhandled(vector));
  }
}

#[test_case]
fn test_frame_changes_are_resumed() {
  INTERRUPT_TABLE.set_handler(0x51, answer);
  let rax: u64;
  let rcx: u64;
  unsafe {
    asm!(
      "int {v}",
      v = const 0x51,
      inlateout("rax") 0u64 => rax,
      inlateout("rcx") 41u64 => rcx,
    );
  }
  INTERRUPT_TABLE.reset_handler(0x51);
  assert_eq!(rax, 0x1234);
  assert_eq!(rcx, 42);
}

#[test_case]
fn test_registers_survive_the_round_trip() {
  INTERRUPT_TABLE.set_handler(0x52, quiet);
  let sent: [u64; 13] = core::array::from_fn(|i| 0x1111_0000_0000_0000 + i as u64);
  let mut got = sent;
  unsafe {
    asm!(
      "int {v}",
      v = const 0x52,
      inout("rax") got[0],
      inout("rcx") got[1],
      inout("rdx") got[2],
      inout("rsi") got[3],
      inout("rdi") got[4],
      inout("r8") got[5],
      inout("r9") got[6],
      inout("r10") got[7],
      inout("r11") got[8],
      inout("r12") got[9],
      inout("r13") got[10],
      inout("r14") got[11],
      inout("r15") got[12],
    );
  }
  INTERRUPT_TABLE.reset_handler(0x52);
  assert_eq!(got, sent);
}

#[test_case]
fn test_breakpoint_resumes() {
  x86_64::instructions::interrupts::int3();
}
