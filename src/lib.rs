//! This crate provides library code for the gate_os kernel: interrupt
//! trampolines, system call dispatch and kernel threads.

#![no_std]
#![feature(custom_test_frameworks)] // use custom test harness
#![test_runner(crate::test_harness::test_runner)] // specify test_runner
#![reexport_test_harness_main = "test_main"]
#![cfg_attr(test, no_main)]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod allocator;
pub mod config;
pub mod gdt;
pub mod interrupts;
pub mod logger;
pub mod memory;
pub mod serial;
pub mod syscall;
pub mod test_harness;
pub mod thread;

use bootloader::BootInfo;
use interrupts::trampoline::TrampolineError;
use syscall::SyscallError;
use thread::ThreadError;
use x86_64::structures::paging::{mapper::MapToError, Size4KiB};
use x86_64::VirtAddr;

#[cfg(test)]
use bootloader::entry_point;
#[cfg(test)]
use core::panic::PanicInfo;

/// Test-only panic handler that prints to serial port
#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
  test_harness::test_panic_handler(info)
}

#[cfg(test)]
entry_point!(test_kernel_main);

/// The entry point of our kernel library,
/// only needed when running tests
#[cfg(test)]
fn test_kernel_main(boot_info: &'static BootInfo) -> ! {
  test_harness::init_or_fail(boot_info);
  test_main();
  test_harness::exit_qemu(test_harness::QemuExitCode::Success)
}

/// A boot step that failed. None of them can be recovered from.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
  /// The heap could not be mapped.
  #[error("mapping the kernel heap failed: {0:?}")]
  Heap(MapToError<Size4KiB>),
  /// The interrupt trampolines could not be generated.
  #[error(transparent)]
  Trampoline(#[from] TrampolineError),
  /// The system call vector could not be set up.
  #[error("system call setup failed: {0}")]
  Syscall(#[from] SyscallError),
  /// The scheduler could not start.
  #[error("scheduler setup failed: {0}")]
  Thread(#[from] ThreadError),
}

/// Init procedure for the kernel. Every handler is registered before
/// interrupts are enabled at the very end.
pub fn init(boot_info: &'static BootInfo) -> Result<(), InitError> {
  logger::init();
  gdt::init_gdt();

  let phys_mem_offset = VirtAddr::new(boot_info.physical_memory_offset);
  let mut mapper = unsafe { memory::init_offset_page_table(phys_mem_offset) };
  let mut frame_allocator =
    unsafe { memory::BootInfoFrameAllocator::init(&boot_info.memory_map) };
  allocator::init_heap(&mut mapper, &mut frame_allocator).map_err(InitError::Heap)?;

  interrupts::init()?;
  syscall::init()?;
  thread::init()?;

  // initialize interrupt controller
  unsafe {
    interrupts::PICS.lock().initialize();
  }
  // enable hardware interrupts
  x86_64::instructions::interrupts::enable();
  log::info!("kernel initialized");
  Ok(())
}

/// Halt the cpu until the next interrupt occurs using
/// a much cpu-cheap mechanism of the hlt instruction.
pub fn hlt_loop() -> ! {
  loop {
    x86_64::instructions::hlt();
  }
}
