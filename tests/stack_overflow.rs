//! A kernel stack overflow must land in the double fault handler, which
//! runs on its own IST stack.

#![no_std]
#![no_main]

use bootloader::{entry_point, BootInfo};
use core::panic::PanicInfo;

use gate_os::interrupts::{RegisterFrame, INTERRUPT_TABLE};
use gate_os::serial_print;
use gate_os::serial_println;
use gate_os::test_harness::{exit_qemu, init_or_fail, test_panic_handler, QemuExitCode};

entry_point!(test_kernel_main);

fn test_kernel_main(boot_info: &'static BootInfo) -> ! {
  serial_print!("stack_overflow::stack_overflow...\t");
  init_or_fail(boot_info);
  INTERRUPT_TABLE.set_handler(8, test_double_fault);

  stack_overflow();

  panic!("Execution continued after stack overflow");
}

#[allow(unconditional_recursion)]
fn stack_overflow() {
  stack_overflow(); // for each recursion, the return address is pushed
  let depth = 0u64;
  unsafe { core::ptr::read_volatile(&depth) }; // prevent tail recursion optimizations
}

extern "C" fn test_double_fault(frame: &mut RegisterFrame) {
  if frame.vector != 8 {
    serial_println!("[failed]\n");
    serial_println!("Error: double fault arrived as vector {:#x}\n", frame.vector);
    exit_qemu(QemuExitCode::Failed);
  }
  serial_println!("[ok]");
  exit_qemu(QemuExitCode::Success);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
  test_panic_handler(info)
}
