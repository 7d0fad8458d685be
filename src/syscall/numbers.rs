//! System call numbers.
//!
//! The numbering is dense: every value below [SyscallNumber::COUNT] has a
//! table entry. Values are grouped by subsystem.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Every system call the dispatch table knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
#[allow(missing_docs)]
pub enum SyscallNumber {
  // process and thread
  Exit = 0,
  Fork = 1,
  Wait = 2,
  Exec = 3,
  Kill = 4,
  Getpid = 5,
  Getppid = 6,
  Sigaction = 7,
  Sigprocmask = 8,
  Sigentry = 9,
  Sigreturn = 10,
  Gettid = 11,
  Yield = 12,
  // filesystem
  Open = 13,
  Read = 14,
  Write = 15,
  Seek = 16,
  Close = 17,
  Stat = 18,
  Fstat = 19,
  Readdir = 20,
  Mkdir = 21,
  Chdir = 22,
  Getcwd = 23,
  Link = 24,
  Unlink = 25,
  Readlink = 26,
  Access = 27,
  // memory
  Mmap = 28,
  Munmap = 29,
  // ipc
  Pipe = 30,
  // synchronization
  FutexWait = 31,
  FutexWake = 32,
  // descriptor control
  Dup = 33,
  Fcntl = 34,
  Ioctl = 35,
  Poll = 36,
}

impl SyscallNumber {
  /// Number of table entries.
  pub const COUNT: usize = 37;

  /// Lowercase name, for tracing.
  pub fn name(self) -> &'static str {
    use SyscallNumber::*;
    match self {
      Exit => "exit",
      Fork => "fork",
      Wait => "wait",
      Exec => "exec",
      Kill => "kill",
      Getpid => "getpid",
      Getppid => "getppid",
      Sigaction => "sigaction",
      Sigprocmask => "sigprocmask",
      Sigentry => "sigentry",
      Sigreturn => "sigreturn",
      Gettid => "gettid",
      Yield => "yield",
      Open => "open",
      Read => "read",
      Write => "write",
      Seek => "seek",
      Close => "close",
      Stat => "stat",
      Fstat => "fstat",
      Readdir => "readdir",
      Mkdir => "mkdir",
      Chdir => "chdir",
      Getcwd => "getcwd",
      Link => "link",
      Unlink => "unlink",
      Readlink => "readlink",
      Access => "access",
      Mmap => "mmap",
      Munmap => "munmap",
      Pipe => "pipe",
      FutexWait => "futex_wait",
      FutexWake => "futex_wake",
      Dup => "dup",
      Fcntl => "fcntl",
      Ioctl => "ioctl",
      Poll => "poll",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use core::convert::TryFrom;

  #[test_case]
  fn test_numbers_are_dense() {
    for raw in 0..SyscallNumber::COUNT as u64 {
      let number = SyscallNumber::try_from(raw).unwrap();
      assert_eq!(u64::from(number), raw);
    }
    assert!(SyscallNumber::try_from(SyscallNumber::COUNT as u64).is_err());
  }

  #[test_case]
  fn test_names() {
    assert_eq!(SyscallNumber::FutexWait.name(), "futex_wait");
    assert_eq!(SyscallNumber::Poll.name(), "poll");
  }
}
