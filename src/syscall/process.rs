//! Process, thread and signal system calls.
//!
//! The kernel runs a single process made of kernel threads, so process
//! ids are constants and fork/exec are unsupported.

use super::{write_out, SyscallArgs, SyscallError, SyscallResult};
use crate::interrupts::RegisterFrame;
use crate::thread::signal::{self, SignalAction};
use crate::thread::{self, ThreadId};

/// Process id of the kernel.
const KERNEL_PID: u64 = 1;

pub(super) fn sys_exit(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  thread::exit(args.arg(0) as usize)
}

pub(super) fn sys_fork(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  Err(SyscallError::NotSupported)
}

/// wait(tid, status): join `tid`, storing its exit value at `status`.
pub(super) fn sys_wait(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let id = ThreadId::from_raw(args.arg(0));
  let value = thread::join(id)?;
  write_out(args.arg(1), value as u64)?;
  Ok(id.as_u64())
}

pub(super) fn sys_exec(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  Err(SyscallError::NotSupported)
}

/// kill(tid, signal)
pub(super) fn sys_kill(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  signal::send(ThreadId::from_raw(args.arg(0)), args.arg(1))?;
  Ok(0)
}

pub(super) fn sys_getpid(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  Ok(KERNEL_PID)
}

pub(super) fn sys_getppid(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  Ok(0)
}

/// sigaction(signal, handler, old_handler)
pub(super) fn sys_sigaction(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let old = signal::set_action(args.arg(0), SignalAction::from_raw(args.arg(1)))?;
  write_out(args.arg(2), old.to_raw())?;
  Ok(0)
}

/// sigprocmask(how, set, old_set)
pub(super) fn sys_sigprocmask(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let old = signal::set_mask(args.arg(0), args.arg(1))?;
  write_out(args.arg(2), old)?;
  Ok(0)
}

/// sigentry(entry): the stub every handler is run through.
pub(super) fn sys_sigentry(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  signal::set_entry(args.arg(0))?;
  Ok(0)
}

/// Resume the context a signal interrupted. The restored RAX is handed
/// back as the result so the dispatcher writes it back unchanged.
pub(super) fn sys_sigreturn(_: &SyscallArgs, frame: &mut RegisterFrame) -> SyscallResult {
  signal::restore(frame)?;
  Ok(frame.rax)
}

pub(super) fn sys_gettid(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  thread::current_id()
    .map(ThreadId::as_u64)
    .ok_or(SyscallError::NoSuchThread)
}

pub(super) fn sys_yield(_: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  thread::yield_now();
  Ok(0)
}
