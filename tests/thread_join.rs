//! Thread creation, exit and join, through the kernel API, the pthread
//! adapter and the wait system call.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(gate_os::test_harness::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use alloc::vec::Vec;
use bootloader::{entry_point, BootInfo};
use core::panic::PanicInfo;

use gate_os::syscall::abi::{decode, syscall1, syscall2};
use gate_os::syscall::{SyscallError, SyscallNumber};
use gate_os::test_harness::{exit_qemu, init_or_fail, test_panic_handler, QemuExitCode};
use gate_os::thread::pthread::{self, PthreadAttr, PthreadT};
use gate_os::thread::{self, ThreadError, ThreadId, ThreadState, FAULT_EXIT_VALUE};

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

fn double(arg: usize) -> usize {
  arg * 2
}

fn exit_early(arg: usize) -> usize {
  thread::exit(arg + 1)
}

fn exit_by_syscall(arg: usize) -> usize {
  unsafe { syscall1(SyscallNumber::Exit, arg as u64) };
  unreachable!()
}

fn invalid_opcode(_: usize) -> usize {
  unsafe { core::arch::asm!("ud2") };
  0
}

fn yield_a_while(arg: usize) -> usize {
  for _ in 0..arg {
    thread::yield_now();
  }
  arg
}

#[test_case]
fn test_join_collects_value_once() {
  let id = thread::spawn(double, 21, false).expect("spawn failed");
  assert_eq!(thread::join(id), Ok(42));
  assert_eq!(thread::join(id), Err(ThreadError::AlreadyJoined));
  assert_eq!(thread::state(id), None);
}

#[test_case]
fn test_join_errors() {
  assert_eq!(thread::join(ThreadId::BOOTSTRAP), Err(ThreadError::JoinSelf));
  assert_eq!(
    thread::join(ThreadId::from_raw(1 << 40)),
    Err(ThreadError::NoSuchThread)
  );
}

#[test_case]
fn test_exit_paths() {
  let early = thread::spawn(exit_early, 6, false).expect("spawn failed");
  let by_syscall = thread::spawn(exit_by_syscall, 9, false).expect("spawn failed");
  assert_eq!(thread::join(early), Ok(7));
  assert_eq!(thread::join(by_syscall), Ok(9));
}

#[test_case]
fn test_fault_ends_only_the_thread() {
  let id = thread::spawn(invalid_opcode, 0, false).expect("spawn failed");
  assert_eq!(thread::join(id), Ok(FAULT_EXIT_VALUE));
}

#[test_case]
fn test_many_threads() {
  let ids: Vec<ThreadId> = (0..16)
    .map(|i| thread::spawn(yield_a_while, i, false).expect("spawn failed"))
    .collect();
  for (i, id) in ids.into_iter().enumerate() {
    assert_eq!(thread::join(id), Ok(i));
  }
}

#[test_case]
fn test_join_after_exit() {
  let id = thread::spawn(double, 5, true).expect("spawn failed");
  while thread::state(id) != Some(ThreadState::Exited) {
    thread::yield_now();
  }
  assert_eq!(thread::join(id), Ok(10));
}

#[test_case]
fn test_pthread_adapter() {
  let mut handle: PthreadT = 0;
  assert_eq!(pthread::pthread_create(&mut handle, None, double, 8), 0);
  let mut value = 0;
  assert_eq!(pthread::pthread_join(handle, Some(&mut value)), 0);
  assert_eq!(value, 16);

  let attr = PthreadAttr { detached: true };
  assert_eq!(pthread::pthread_create(&mut handle, Some(&attr), double, 1), 0);
  assert_eq!(pthread::pthread_detach(handle), 0);
  assert_eq!(pthread::pthread_join(handle, None), 0);

  assert_eq!(pthread::pthread_join(1 << 40, None), 3);
  assert_eq!(pthread::pthread_self(), 0);
}

#[test_case]
fn test_wait_syscall() {
  let id = thread::spawn(double, 50, false).expect("spawn failed");
  let mut status = 0u64;
  let raw = unsafe {
    syscall2(SyscallNumber::Wait, id.as_u64(), &mut status as *mut u64 as u64)
  };
  assert_eq!(decode(raw), Ok(id.as_u64()));
  assert_eq!(status, 100);

  let raw = unsafe { syscall2(SyscallNumber::Wait, id.as_u64(), 0) };
  assert_eq!(decode(raw), Err(SyscallError::InvalidArgument));
  let raw = unsafe { syscall2(SyscallNumber::Wait, 0, 0) };
  assert_eq!(decode(raw), Err(SyscallError::Deadlock));
}
