//! System call error codes.
//!
//! Errors travel back in RAX as negative errno values, so any RAX in
//! `-4095..0` read as signed is an error.

use crate::thread::futex::FutexError;
use crate::thread::ThreadError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Why a system call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, thiserror::Error)]
#[must_use]
#[repr(i64)]
#[allow(missing_docs)]
pub enum SyscallError {
  #[error("Operation not permitted")]
  PermissionDenied = -1,
  #[error("No such thread")]
  NoSuchThread = -3,
  #[error("Interrupted system call")]
  Interrupted = -4,
  #[error("Bad file descriptor")]
  BadDescriptor = -9,
  #[error("Resource temporarily unavailable")]
  Again = -11,
  #[error("Cannot allocate memory")]
  OutOfMemory = -12,
  #[error("Bad address")]
  Fault = -14,
  #[error("Invalid argument")]
  InvalidArgument = -22,
  #[error("Resource deadlock avoided")]
  Deadlock = -35,
  #[error("Function not implemented")]
  NoSuchSyscall = -38,
  #[error("Operation not supported")]
  NotSupported = -95,
}

impl SyscallError {
  /// The value stored in RAX.
  #[inline]
  pub fn to_raw(self) -> u64 {
    (self as i64) as u64
  }

  /// Decode a RAX value, `None` when it is not an error.
  pub fn from_raw(raw: u64) -> Option<Self> {
    Self::try_from(raw as i64).ok()
  }

  /// The positive errno.
  pub fn errno(self) -> i64 {
    -(self as i64)
  }

  /// Symbolic errno name.
  pub fn name(self) -> &'static str {
    match self {
      SyscallError::PermissionDenied => "EPERM",
      SyscallError::NoSuchThread => "ESRCH",
      SyscallError::Interrupted => "EINTR",
      SyscallError::BadDescriptor => "EBADF",
      SyscallError::Again => "EAGAIN",
      SyscallError::OutOfMemory => "ENOMEM",
      SyscallError::Fault => "EFAULT",
      SyscallError::InvalidArgument => "EINVAL",
      SyscallError::Deadlock => "EDEADLK",
      SyscallError::NoSuchSyscall => "ENOSYS",
      SyscallError::NotSupported => "EOPNOTSUPP",
    }
  }
}

impl From<ThreadError> for SyscallError {
  fn from(error: ThreadError) -> Self {
    match error {
      ThreadError::JoinSelf => SyscallError::Deadlock,
      ThreadError::NoSuchThread => SyscallError::NoSuchThread,
      ThreadError::AlreadyJoined | ThreadError::NotJoinable | ThreadError::StateWord => {
        SyscallError::InvalidArgument
      }
      ThreadError::OutOfMemory | ThreadError::TooManyThreads => SyscallError::Again,
      ThreadError::NotRunning => SyscallError::PermissionDenied,
    }
  }
}

impl From<FutexError> for SyscallError {
  fn from(error: FutexError) -> Self {
    match error {
      FutexError::ValueMismatch => SyscallError::Again,
      FutexError::InvalidAddress => SyscallError::InvalidArgument,
      FutexError::Thread(error) => error.into(),
    }
  }
}

/// Outcome of a system call handler.
pub type SyscallResult = Result<u64, SyscallError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_raw_encoding() {
    assert_eq!(SyscallError::NoSuchSyscall.to_raw(), -38i64 as u64);
    assert_eq!(SyscallError::NoSuchSyscall.errno(), 38);
    assert_eq!(
      SyscallError::from_raw(SyscallError::Again.to_raw()),
      Some(SyscallError::Again)
    );
    assert_eq!(SyscallError::from_raw(5), None);
  }

  #[test_case]
  fn test_errno_values() {
    assert_eq!(SyscallError::NotSupported.errno(), 95);
    assert_eq!(SyscallError::InvalidArgument.errno(), 22);
    assert_eq!(SyscallError::NoSuchThread.name(), "ESRCH");
  }

  #[test_case]
  fn test_thread_errors_map() {
    assert_eq!(SyscallError::from(ThreadError::JoinSelf), SyscallError::Deadlock);
    assert_eq!(
      SyscallError::from(FutexError::ValueMismatch),
      SyscallError::Again
    );
  }
}
