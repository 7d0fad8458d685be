//! This module contains the kernel's threads: creation, exit, join and
//! the futex primitive the blocking operations are built on.
//!
//! A thread's state word doubles as the futex its joiners sleep on, so
//! join needs no bookkeeping beyond the thread table.

pub mod context;
pub mod futex;
pub mod pthread;
pub mod scheduler;
pub mod signal;

use crate::config::THREAD_STACK_SIZE;
use context::KernelStack;
use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use futex::FutexError;
use signal::SignalState;

/// Exit value of a thread terminated by a CPU fault.
pub const FAULT_EXIT_VALUE: usize = usize::MAX;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of threads. Identifiers are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
  /// The thread the kernel booted on.
  pub const BOOTSTRAP: ThreadId = ThreadId(0);

  /// Generate an auto-incrementing thread id.
  fn new() -> Self {
    ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
  }

  /// Rebuild an id handed across the syscall or pthread boundary.
  pub const fn from_raw(raw: u64) -> Self {
    ThreadId(raw)
  }

  /// The raw id.
  pub const fn as_u64(self) -> u64 {
    self.0
  }

  fn was_issued(self) -> bool {
    self.0 < NEXT_ID.load(Ordering::Relaxed)
  }
}

impl fmt::Display for ThreadId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Scheduling state, stored in the thread's futex word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadState {
  /// Waiting in the run queue.
  Runnable = 0,
  /// On the CPU.
  Running = 1,
  /// Sleeping on a futex.
  Blocked = 2,
  /// Finished, exit value available to a joiner.
  Exited = 3,
}

impl ThreadState {
  fn from_raw(raw: u32) -> Self {
    match raw {
      0 => ThreadState::Runnable,
      1 => ThreadState::Running,
      2 => ThreadState::Blocked,
      _ => ThreadState::Exited,
    }
  }
}

/// Errors of the thread API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ThreadError {
  /// No scheduler, or no current thread.
  #[error("threads are not running")]
  NotRunning,
  /// A thread tried to join itself.
  #[error("a thread cannot join itself")]
  JoinSelf,
  /// The thread was already collected or claimed by another joiner.
  #[error("thread was already joined")]
  AlreadyJoined,
  /// The id was never issued.
  #[error("no such thread")]
  NoSuchThread,
  /// The idle thread never exits.
  #[error("thread cannot be joined")]
  NotJoinable,
  /// No memory for the thread's stack.
  #[error("out of memory for a thread stack")]
  OutOfMemory,
  /// The run queue is full.
  #[error("too many threads")]
  TooManyThreads,
  /// The joined thread's state word could not be waited on.
  #[error("thread state word cannot be waited on")]
  StateWord,
}

/// Entry point of a kernel thread. Its return value is the exit value.
pub type ThreadEntry = fn(usize) -> usize;

/// Start arguments, stored at the top of the new thread's stack.
pub(crate) struct ThreadStart {
  pub(crate) entry: ThreadEntry,
  pub(crate) arg: usize,
}

/// A kernel thread.
pub struct Thread {
  id: ThreadId,
  state: AtomicU32,
  exit_value: AtomicUsize,
  detached: AtomicBool,
  joined: AtomicBool,
  joinable: bool,
  /// Saved stack pointer while switched out.
  context: UnsafeCell<u64>,
  /// Freed together with the thread, never read.
  #[allow(dead_code)]
  stack: Option<KernelStack>,
  pub(crate) signals: spin::Mutex<SignalState>,
}

// SAFETY: `context` is only touched by the scheduler with interrupts
// masked, on the single CPU that runs threads
unsafe impl Sync for Thread {}
unsafe impl Send for Thread {}

impl Thread {
  /// The thread that was already running when the scheduler came up.
  fn bootstrap() -> Self {
    Self::with_stack(ThreadId::new(), None, ThreadState::Running, 0, true)
  }

  fn spawn(start: ThreadStart, joinable: bool) -> Result<Self, ThreadError> {
    let mut stack =
      KernelStack::new(THREAD_STACK_SIZE).ok_or(ThreadError::OutOfMemory)?;
    let rsp = stack.prepare(start);
    Ok(Self::with_stack(
      ThreadId::new(),
      Some(stack),
      ThreadState::Runnable,
      rsp,
      joinable,
    ))
  }

  fn with_stack(
    id: ThreadId,
    stack: Option<KernelStack>,
    state: ThreadState,
    rsp: u64,
    joinable: bool,
  ) -> Self {
    Thread {
      id,
      state: AtomicU32::new(state as u32),
      exit_value: AtomicUsize::new(0),
      detached: AtomicBool::new(false),
      joined: AtomicBool::new(false),
      joinable,
      context: UnsafeCell::new(rsp),
      stack,
      signals: spin::Mutex::new(SignalState::new()),
    }
  }

  /// The thread's id.
  pub fn id(&self) -> ThreadId {
    self.id
  }

  /// Current scheduling state.
  pub fn state(&self) -> ThreadState {
    ThreadState::from_raw(self.state.load(Ordering::Acquire))
  }

  fn set_state(&self, state: ThreadState) {
    self.state.store(state as u32, Ordering::Release);
  }

  /// Atomically move from `from` to `to`, failing if the state changed.
  fn transition(&self, from: ThreadState, to: ThreadState) -> bool {
    self
      .state
      .compare_exchange(from as u32, to as u32, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Whether detach was requested.
  pub fn is_detached(&self) -> bool {
    self.detached.load(Ordering::Relaxed)
  }
}

/// Bring up the scheduler, adopting the calling context as the
/// bootstrap thread.
pub fn init() -> Result<(), ThreadError> {
  scheduler::init()
}

/// Create a thread running `entry(arg)`. It becomes runnable right away;
/// the caller keeps running.
pub fn spawn(entry: ThreadEntry, arg: usize, detached: bool) -> Result<ThreadId, ThreadError> {
  let thread = Thread::spawn(ThreadStart { entry, arg }, true)?;
  thread.detached.store(detached, Ordering::Relaxed);
  scheduler::add(thread)
}

/// Wait for thread `id` to exit and collect its exit value. Each thread
/// can be joined once.
pub fn join(id: ThreadId) -> Result<usize, ThreadError> {
  let me = current_id().ok_or(ThreadError::NotRunning)?;
  if id == me {
    return Err(ThreadError::JoinSelf);
  }
  let thread = match scheduler::lookup(id) {
    Some(thread) => thread,
    None if id.was_issued() => return Err(ThreadError::AlreadyJoined),
    None => return Err(ThreadError::NoSuchThread),
  };
  if !thread.joinable {
    return Err(ThreadError::NotJoinable);
  }
  if thread.joined.swap(true, Ordering::AcqRel) {
    return Err(ThreadError::AlreadyJoined);
  }

  loop {
    let state = thread.state.load(Ordering::Acquire);
    if state == ThreadState::Exited as u32 {
      break;
    }
    if let Err(error) = recheck_after_wait(futex::wait(&thread.state, state)) {
      // give the claim back so a later join can retry
      thread.joined.store(false, Ordering::Release);
      return Err(error);
    }
  }

  let value = thread.exit_value.load(Ordering::Acquire);
  scheduler::remove(id);
  log::debug!("thread {} joined, exit value {:#x}", id, value);
  Ok(value)
}

/// Sort the outcome of a joiner's futex wait: a wake or a mismatch means
/// the state moved on and is looked at again, anything else ends the join.
fn recheck_after_wait(result: Result<(), FutexError>) -> Result<(), ThreadError> {
  match result {
    Ok(()) | Err(FutexError::ValueMismatch) => Ok(()),
    Err(FutexError::Thread(error)) => Err(error),
    Err(FutexError::InvalidAddress) => Err(ThreadError::StateWord),
  }
}

/// Terminate the calling thread with `value`, waking its joiner.
pub fn exit(value: usize) -> ! {
  x86_64::instructions::interrupts::disable();
  let thread = match scheduler::current() {
    Some(thread) => thread,
    None => panic!("thread exit before the scheduler started"),
  };
  thread.exit_value.store(value, Ordering::Release);
  thread.set_state(ThreadState::Exited);
  let woken = futex::wake(&thread.state as *const AtomicU32 as usize, usize::MAX);
  log::debug!(
    "thread {}{} exited with {:#x}, {} joiner(s) woken",
    thread.id,
    if thread.is_detached() { " (detached)" } else { "" },
    value,
    woken
  );
  drop(thread);

  scheduler::schedule();
  unreachable!("exited thread was scheduled again");
}

/// Mark thread `id` detached. Its exit value is still kept until joined.
pub fn detach(id: ThreadId) -> Result<(), ThreadError> {
  let thread = scheduler::lookup(id).ok_or(ThreadError::NoSuchThread)?;
  thread.detached.store(true, Ordering::Relaxed);
  Ok(())
}

/// Give the CPU to the next runnable thread.
pub fn yield_now() {
  scheduler::schedule();
}

/// Id of the calling thread, `None` before the scheduler starts.
pub fn current_id() -> Option<ThreadId> {
  scheduler::current().map(|thread| thread.id)
}

/// State of thread `id`, `None` once it was joined.
pub fn state(id: ThreadId) -> Option<ThreadState> {
  scheduler::lookup(id).map(|thread| thread.state())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn add_one(arg: usize) -> usize {
    arg + 1
  }

  #[test_case]
  fn test_spawn_and_join() {
    let id = spawn(add_one, 41, false).unwrap();
    assert_eq!(join(id), Ok(42));
    assert_eq!(join(id), Err(ThreadError::AlreadyJoined));
    assert_eq!(state(id), None);
  }

  #[test_case]
  fn test_join_errors() {
    assert_eq!(join(current_id().unwrap()), Err(ThreadError::JoinSelf));
    assert_eq!(
      join(ThreadId::from_raw(u64::MAX)),
      Err(ThreadError::NoSuchThread)
    );
  }

  #[test_case]
  fn test_join_wait_errors_end_the_join() {
    assert_eq!(recheck_after_wait(Ok(())), Ok(()));
    assert_eq!(recheck_after_wait(Err(FutexError::ValueMismatch)), Ok(()));
    assert_eq!(
      recheck_after_wait(Err(FutexError::Thread(ThreadError::NotRunning))),
      Err(ThreadError::NotRunning)
    );
    assert_eq!(
      recheck_after_wait(Err(FutexError::InvalidAddress)),
      Err(ThreadError::StateWord)
    );
  }

  #[test_case]
  fn test_state_codes() {
    for state in [
      ThreadState::Runnable,
      ThreadState::Running,
      ThreadState::Blocked,
      ThreadState::Exited,
    ] {
      assert_eq!(ThreadState::from_raw(state as u32), state);
    }
  }
}
