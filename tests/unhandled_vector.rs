//! A vector nobody registered for ends in the default handler, which
//! records the vector and panics.

#![no_std]
#![no_main]

use bootloader::{entry_point, BootInfo};
use core::panic::PanicInfo;

use gate_os::interrupts::table::{last_unhandled_vector, unhandled_count};
use gate_os::test_harness::{exit_qemu, init_or_fail, QemuExitCode};
use gate_os::{serial_print, serial_println};

entry_point!(test_kernel_main);

fn test_kernel_main(boot_info: &'static BootInfo) -> ! {
  serial_print!("unhandled_vector::unhandled_vector...\t");
  init_or_fail(boot_info);
  assert_eq!(unhandled_count(), 0);

  unsafe { core::arch::asm!("int 0x42") };

  serial_println!("[failed]\n");
  serial_println!("Error: execution continued after an unhandled vector\n");
  exit_qemu(QemuExitCode::Failed);
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
  if last_unhandled_vector() == Some(0x42) && unhandled_count() == 1 {
    serial_println!("[ok]");
    exit_qemu(QemuExitCode::Success);
  }
  serial_println!("[failed]\n");
  serial_println!("Error: panic did not come from vector 0x42\n");
  exit_qemu(QemuExitCode::Failed);
}
