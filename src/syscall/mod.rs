//! System call dispatch.
//!
//! A system call is `int 0x80` with the number in RAX and up to six
//! arguments in RDI, RSI, RDX, R10, R8 and R9. The result comes back in
//! RAX: the value on success, a negative errno on failure. Numbers index
//! a dense table after a single bounds check, so an unknown number costs
//! nothing but an `ENOSYS`.

pub mod abi;
pub mod error;
mod fs;
mod mm;
pub mod numbers;
mod process;
mod sync;

pub use error::{SyscallError, SyscallResult};
pub use numbers::SyscallNumber;

use crate::config::SYSCALL_VECTOR;
use crate::interrupts::{RegisterFrame, INTERRUPT_TABLE};
use crate::thread::signal;
use core::mem::align_of;

/// A system call's number and arguments, read out of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallArgs {
  /// Value of RAX on entry.
  pub number: u64,
  /// RDI, RSI, RDX, R10, R8, R9.
  pub args: [u64; 6],
}

impl SyscallArgs {
  /// Read number and arguments from `frame`.
  pub fn from_frame(frame: &RegisterFrame) -> Self {
    SyscallArgs {
      number: frame.syscall_number(),
      args: frame.syscall_args(),
    }
  }

  /// Argument `index`, counted from zero.
  pub fn arg(&self, index: usize) -> u64 {
    self.args[index]
  }
}

/// A table entry. Handlers may rewrite the frame; the returned value is
/// still written to RAX afterwards.
pub type SyscallHandler = fn(&SyscallArgs, &mut RegisterFrame) -> SyscallResult;

static SYSCALL_TABLE: [SyscallHandler; SyscallNumber::COUNT] = [
  // process and thread
  process::sys_exit,
  process::sys_fork,
  process::sys_wait,
  process::sys_exec,
  process::sys_kill,
  process::sys_getpid,
  process::sys_getppid,
  process::sys_sigaction,
  process::sys_sigprocmask,
  process::sys_sigentry,
  process::sys_sigreturn,
  process::sys_gettid,
  process::sys_yield,
  // filesystem
  fs::sys_unsupported, // open
  fs::sys_unsupported, // read
  fs::sys_write,
  fs::sys_unsupported, // seek
  fs::sys_unsupported, // close
  fs::sys_unsupported, // stat
  fs::sys_unsupported, // fstat
  fs::sys_unsupported, // readdir
  fs::sys_unsupported, // mkdir
  fs::sys_unsupported, // chdir
  fs::sys_unsupported, // getcwd
  fs::sys_unsupported, // link
  fs::sys_unsupported, // unlink
  fs::sys_unsupported, // readlink
  fs::sys_unsupported, // access
  // memory
  mm::sys_mmap,
  mm::sys_munmap,
  // ipc
  fs::sys_unsupported, // pipe
  // synchronization
  sync::sys_futex_wait,
  sync::sys_futex_wake,
  // descriptor control
  fs::sys_unsupported, // dup
  fs::sys_unsupported, // fcntl
  fs::sys_unsupported, // ioctl
  fs::sys_unsupported, // poll
];

/// Number of entries in the dispatch table.
pub fn table_len() -> usize {
  SYSCALL_TABLE.len()
}

/// Route the system call described by `frame` and store its result in
/// RAX. An out-of-range number leaves every other register untouched.
pub fn dispatch(frame: &mut RegisterFrame) {
  let args = SyscallArgs::from_frame(frame);
  let handler = match usize::try_from(args.number)
    .ok()
    .and_then(|index| SYSCALL_TABLE.get(index))
  {
    Some(handler) => handler,
    None => {
      log::debug!("no system call {:#x} at {:#x}", args.number, frame.rip);
      frame.set_return(SyscallError::NoSuchSyscall.to_raw());
      return;
    }
  };

  let result = handler(&args, frame);
  #[cfg(feature = "trace-syscalls")]
  trace(&args, &result);
  frame.set_return(encode(result));
}

/// The RAX value of a handler result.
pub fn encode(result: SyscallResult) -> u64 {
  match result {
    Ok(value) => value,
    Err(error) => error.to_raw(),
  }
}

#[cfg(feature = "trace-syscalls")]
fn trace(args: &SyscallArgs, result: &SyscallResult) {
  let name = SyscallNumber::try_from(args.number).map_or("?", SyscallNumber::name);
  match result {
    Ok(value) => log::trace!("{}({:#x?}) = {:#x}", name, args.args, value),
    Err(error) => log::trace!("{}({:#x?}) = {}", name, args.args, error.name()),
  }
}

/// Handler of the system call vector. Pending signals are delivered on
/// the way out, after the result is in place.
extern "C" fn syscall_entry(frame: &mut RegisterFrame) {
  dispatch(frame);
  signal::deliver_pending(frame);
}

/// Route the system call vector to the dispatcher and register the
/// kernel's signal entry stub.
pub fn init() -> Result<(), SyscallError> {
  INTERRUPT_TABLE.set_handler(SYSCALL_VECTOR, syscall_entry);
  signal::set_entry(signal::kernel_entry())?;
  log::info!(
    "system calls on vector {:#x}, {} entries",
    SYSCALL_VECTOR,
    table_len()
  );
  Ok(())
}

/// Lowest address a system call may read or write.
const MIN_ADDRESS: u64 = 0x1000;

/// Store `value` at `addr` for the caller. A zero address means the
/// caller does not want the value.
fn write_out<T>(addr: u64, value: T) -> Result<(), SyscallError> {
  if addr == 0 {
    return Ok(());
  }
  if addr < MIN_ADDRESS || addr as usize % align_of::<T>() != 0 {
    return Err(SyscallError::Fault);
  }
  unsafe { (addr as *mut T).write(value) };
  Ok(())
}

/// The caller's buffer of `len` bytes at `addr`.
fn user_bytes<'a>(addr: u64, len: u64) -> Result<&'a [u8], SyscallError> {
  if len == 0 {
    return Ok(&[]);
  }
  if addr < MIN_ADDRESS || addr.checked_add(len).is_none() {
    return Err(SyscallError::Fault);
  }
  Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len as usize) })
}
