//! POSIX-thread style adapter over the kernel thread API, for code
//! written against pthreads.
//!
//! Return codes follow POSIX: 0 on success, a positive errno otherwise.
//! Joining yourself or joining a thread twice is a kernel bug here and
//! panics.

use super::{ThreadError, ThreadId};
use crate::syscall::SyscallError;

/// Handle of a thread.
pub type PthreadT = u64;

/// Creation attributes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PthreadAttr {
  /// Start the thread detached.
  pub detached: bool,
}

fn errno(error: SyscallError) -> i32 {
  error.errno() as i32
}

/// Start `start(arg)` in a new thread and store its handle in `thread`.
pub fn pthread_create(
  thread: &mut PthreadT,
  attr: Option<&PthreadAttr>,
  start: fn(usize) -> usize,
  arg: usize,
) -> i32 {
  let detached = attr.map_or(false, |attr| attr.detached);
  match super::spawn(start, arg, detached) {
    Ok(id) => {
      *thread = id.as_u64();
      0
    }
    Err(error) => {
      log::warn!("pthread_create failed: {}", error);
      errno(SyscallError::Again)
    }
  }
}

/// Wait for `thread` and store its exit value in `retval`.
pub fn pthread_join(thread: PthreadT, retval: Option<&mut usize>) -> i32 {
  match super::join(ThreadId::from_raw(thread)) {
    Ok(value) => {
      if let Some(retval) = retval {
        *retval = value;
      }
      0
    }
    Err(error @ (ThreadError::JoinSelf | ThreadError::AlreadyJoined)) => {
      panic!("pthread_join({}): {}", thread, error)
    }
    Err(error) => errno(error.into()),
  }
}

/// Acknowledge a detach request. The exit value is still kept until
/// someone joins the thread.
pub fn pthread_detach(thread: PthreadT) -> i32 {
  if let Err(error) = super::detach(ThreadId::from_raw(thread)) {
    log::debug!("pthread_detach({}): {}", thread, error);
  }
  0
}

/// End the calling thread with `value`.
pub fn pthread_exit(value: usize) -> ! {
  super::exit(value)
}

/// Handle of the calling thread.
pub fn pthread_self() -> PthreadT {
  super::current_id().map_or(ThreadId::BOOTSTRAP.as_u64(), ThreadId::as_u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn triple(arg: usize) -> usize {
    arg * 3
  }

  #[test_case]
  fn test_create_join() {
    let mut handle = 0;
    assert_eq!(pthread_create(&mut handle, None, triple, 14), 0);
    let mut value = 0;
    assert_eq!(pthread_join(handle, Some(&mut value)), 0);
    assert_eq!(value, 42);
  }

  #[test_case]
  fn test_detach_acknowledged() {
    let mut handle = 0;
    let attr = PthreadAttr { detached: true };
    assert_eq!(pthread_create(&mut handle, Some(&attr), triple, 1), 0);
    assert_eq!(pthread_detach(handle), 0);
    assert_eq!(pthread_join(handle, None), 0);
  }

  #[test_case]
  fn test_join_unknown_thread() {
    assert_eq!(pthread_join(u64::MAX, None), 3);
  }
}
