//! System calls issued with `int 0x80`, checked from the caller's side.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(gate_os::test_harness::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::{entry_point, BootInfo};
use core::arch::asm;
use core::panic::PanicInfo;

use gate_os::syscall::abi::{decode, syscall0, syscall2, syscall3, syscall6, syscall_raw};
use gate_os::syscall::{SyscallError, SyscallNumber};
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

const PROT_READ_WRITE: u64 = 0x3;
const MAP_PRIVATE_ANONYMOUS: u64 = 0x22;

#[test_case]
fn test_unknown_numbers_only_touch_rax() {
  for number in [SyscallNumber::COUNT as u64, 999] {
    let sent: [u64; 12] = core::array::from_fn(|i| 0xabcd_0000 + i as u64);
    let mut got = sent;
    let rax: u64;
    unsafe {
      asm!(
        "int 0x80",
        inlateout("rax") number => rax,
        inout("rcx") got[0],
        inout("rdx") got[1],
        inout("rsi") got[2],
        inout("rdi") got[3],
        inout("r8") got[4],
        inout("r9") got[5],
        inout("r10") got[6],
        inout("r11") got[7],
        inout("r12") got[8],
        inout("r13") got[9],
        inout("r14") got[10],
        inout("r15") got[11],
      );
    }
    assert_eq!(decode(rax), Err(SyscallError::NoSuchSyscall));
    assert_eq!(rax as i64, -38);
    assert_eq!(got, sent);
  }
}

#[test_case]
fn test_identity_calls() {
  assert_eq!(decode(unsafe { syscall0(SyscallNumber::Getpid) }), Ok(1));
  assert_eq!(decode(unsafe { syscall0(SyscallNumber::Getppid) }), Ok(0));
  assert_eq!(decode(unsafe { syscall0(SyscallNumber::Gettid) }), Ok(0));
  assert_eq!(decode(unsafe { syscall0(SyscallNumber::Yield) }), Ok(0));
}

#[test_case]
fn test_write_to_console() {
  let text = b"syscall_abi: hello from int 0x80\n";
  let raw = unsafe { syscall3(SyscallNumber::Write, 2, text.as_ptr() as u64, text.len() as u64) };
  assert_eq!(decode(raw), Ok(text.len() as u64));

  let raw = unsafe { syscall3(SyscallNumber::Write, 1, 0x10, 4) };
  assert_eq!(decode(raw), Err(SyscallError::Fault));
}

#[test_case]
fn test_unsupported_calls() {
  for number in [
    SyscallNumber::Fork,
    SyscallNumber::Exec,
    SyscallNumber::Open,
    SyscallNumber::Pipe,
    SyscallNumber::Poll,
  ] {
    let raw = unsafe { syscall0(number) };
    assert_eq!(decode(raw), Err(SyscallError::NotSupported));
  }
}

#[test_case]
fn test_anonymous_mappings() {
  let len = 5000;
  let raw = unsafe {
    syscall6(
      SyscallNumber::Mmap,
      [0, len, PROT_READ_WRITE, MAP_PRIVATE_ANONYMOUS, u64::MAX, 0],
    )
  };
  let start = decode(raw).expect("mmap failed");
  assert_eq!(start % 4096, 0);

  let memory = unsafe { core::slice::from_raw_parts_mut(start as *mut u8, 8192) };
  assert!(memory.iter().all(|&byte| byte == 0));
  memory.fill(0x5a);

  assert_eq!(decode(unsafe { syscall2(SyscallNumber::Munmap, start, len) }), Ok(0));
  assert_eq!(
    decode(unsafe { syscall2(SyscallNumber::Munmap, start, len) }),
    Err(SyscallError::InvalidArgument)
  );
}

#[test_case]
fn test_mmap_rejects_file_mappings() {
  let raw = unsafe { syscall6(SyscallNumber::Mmap, [0, 4096, PROT_READ_WRITE, 0x02, 3, 0]) };
  assert_eq!(decode(raw), Err(SyscallError::NotSupported));
  let raw = unsafe {
    syscall6(SyscallNumber::Mmap, [0, 0, PROT_READ_WRITE, MAP_PRIVATE_ANONYMOUS, 0, 0])
  };
  assert_eq!(decode(raw), Err(SyscallError::InvalidArgument));
}

#[test_case]
fn test_raw_numbers_match_table_order() {
  let raw = unsafe { syscall_raw(SyscallNumber::Getpid as u64, [0; 6]) };
  assert_eq!(decode(raw), Ok(1));
  let raw = unsafe { syscall_raw(u64::MAX, [0; 6]) };
  assert_eq!(decode(raw), Err(SyscallError::NoSuchSyscall));
}
