//! Raw `int 0x80` system call stubs, for kernel code that wants to go
//! through the same path a user program would.

use super::{SyscallError, SyscallNumber, SyscallResult};
use crate::config::SYSCALL_VECTOR;
use core::arch::asm;

/// Issue system call `number` without arguments.
///
/// # Safety
/// The call may block, exit the thread or rewrite the caller's context
/// the way the chosen system call documents.
#[inline(always)]
pub unsafe fn syscall0(number: SyscallNumber) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") u64::from(number) => ret,
    );
  }
  ret
}

/// Issue system call `number` with one argument.
///
/// # Safety
/// See [syscall0]. Pointer arguments must be valid for the call.
#[inline(always)]
pub unsafe fn syscall1(number: SyscallNumber, arg0: u64) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") u64::from(number) => ret,
      in("rdi") arg0,
    );
  }
  ret
}

/// Issue system call `number` with two arguments.
///
/// # Safety
/// See [syscall1].
#[inline(always)]
pub unsafe fn syscall2(number: SyscallNumber, arg0: u64, arg1: u64) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") u64::from(number) => ret,
      in("rdi") arg0,
      in("rsi") arg1,
    );
  }
  ret
}

/// Issue system call `number` with three arguments.
///
/// # Safety
/// See [syscall1].
#[inline(always)]
pub unsafe fn syscall3(number: SyscallNumber, arg0: u64, arg1: u64, arg2: u64) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") u64::from(number) => ret,
      in("rdi") arg0,
      in("rsi") arg1,
      in("rdx") arg2,
    );
  }
  ret
}

/// Issue system call `number` with six arguments.
///
/// # Safety
/// See [syscall1].
#[inline(always)]
pub unsafe fn syscall6(
  number: SyscallNumber,
  args: [u64; 6],
) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") u64::from(number) => ret,
      in("rdi") args[0],
      in("rsi") args[1],
      in("rdx") args[2],
      in("r10") args[3],
      in("r8") args[4],
      in("r9") args[5],
    );
  }
  ret
}

/// Issue a system call by raw number, for numbers outside the table.
///
/// # Safety
/// See [syscall1].
#[inline(always)]
pub unsafe fn syscall_raw(number: u64, args: [u64; 6]) -> u64 {
  let ret: u64;
  unsafe {
    asm!(
      "int {vector}",
      vector = const SYSCALL_VECTOR,
      inlateout("rax") number => ret,
      in("rdi") args[0],
      in("rsi") args[1],
      in("rdx") args[2],
      in("r10") args[3],
      in("r8") args[4],
      in("r9") args[5],
    );
  }
  ret
}

/// Split a raw RAX value into value or error.
pub fn decode(raw: u64) -> SyscallResult {
  match SyscallError::from_raw(raw) {
    Some(error) => Err(error),
    None => Ok(raw),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_getpid_via_interrupt() {
    assert_eq!(unsafe { syscall0(SyscallNumber::Getpid) }, 1);
    assert_eq!(unsafe { syscall0(SyscallNumber::Getppid) }, 0);
  }

  #[test_case]
  fn test_unknown_number_via_interrupt() {
    let raw = unsafe { syscall_raw(999, [0; 6]) };
    assert_eq!(decode(raw), Err(SyscallError::NoSuchSyscall));
  }

  #[test_case]
  fn test_write_console() {
    let text = b"written through int 0x80\n";
    let raw = unsafe {
      syscall3(SyscallNumber::Write, 1, text.as_ptr() as u64, text.len() as u64)
    };
    assert_eq!(decode(raw), Ok(text.len() as u64));

    let raw = unsafe { syscall3(SyscallNumber::Write, 7, text.as_ptr() as u64, 1) };
    assert_eq!(decode(raw), Err(SyscallError::BadDescriptor));
  }
}
