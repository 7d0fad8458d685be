//! Futex system calls.

use super::{SyscallArgs, SyscallError, SyscallResult};
use crate::interrupts::RegisterFrame;
use crate::thread::futex;

/// futex_wait(addr, expected): sleep while the word at `addr` holds
/// `expected`. `EAGAIN` when it does not, `EINVAL` when `expected` does
/// not fit the 32-bit word.
pub(super) fn sys_futex_wait(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let word = futex::word_at(args.arg(0) as usize)?;
  let expected = u32::try_from(args.arg(1)).map_err(|_| SyscallError::InvalidArgument)?;
  futex::wait(word, expected)?;
  Ok(0)
}

/// futex_wake(addr, count): returns the number of threads woken.
pub(super) fn sys_futex_wake(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let word = futex::word_at(args.arg(0) as usize)?;
  Ok(futex::wake_word(word, args.arg(1) as usize) as u64)
}
