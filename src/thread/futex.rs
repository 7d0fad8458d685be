//! Futex-style wait and wake on 32-bit words.
//!
//! A waiter compares the word and enqueues itself under one lock, with
//! interrupts masked, so a wake issued after the word changed can never
//! slip in between and be lost. Waiters of one address are woken in the
//! order they arrived.

use super::{scheduler, Thread, ThreadError};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;
use x86_64::instructions::interrupts;

/// Errors of [wait].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FutexError {
  /// The word no longer held the expected value.
  #[error("futex word did not hold the expected value")]
  ValueMismatch,
  /// Null or misaligned address.
  #[error("invalid futex address")]
  InvalidAddress,
  /// No thread to put to sleep.
  #[error(transparent)]
  Thread(#[from] ThreadError),
}

/// FIFO queues of waiters, keyed by address.
pub struct WaitQueues<W> {
  queues: BTreeMap<usize, VecDeque<W>>,
}

impl<W> WaitQueues<W> {
  /// No waiters anywhere.
  pub const fn new() -> Self {
    WaitQueues {
      queues: BTreeMap::new(),
    }
  }

  /// Append `waiter` to the queue of `addr`.
  pub fn enqueue(&mut self, addr: usize, waiter: W) {
    self.queues.entry(addr).or_default().push_back(waiter);
  }

  /// Remove up to `max` waiters of `addr`, oldest first. An emptied
  /// queue is dropped.
  pub fn dequeue(&mut self, addr: usize, max: usize) -> Vec<W> {
    let mut woken = Vec::new();
    if let Some(queue) = self.queues.get_mut(&addr) {
      let count = max.min(queue.len());
      woken.extend(queue.drain(..count));
      if queue.is_empty() {
        self.queues.remove(&addr);
      }
    }
    woken
  }

  /// Number of waiters on `addr`.
  pub fn waiters(&self, addr: usize) -> usize {
    self.queues.get(&addr).map_or(0, VecDeque::len)
  }

  /// Number of addresses with at least one waiter.
  pub fn addresses(&self) -> usize {
    self.queues.len()
  }
}

impl<W> Default for WaitQueues<W> {
  fn default() -> Self {
    Self::new()
  }
}

static FUTEX: Mutex<WaitQueues<Arc<Thread>>> = Mutex::new(WaitQueues::new());

fn check_address(addr: usize) -> Result<(), FutexError> {
  if addr == 0 || addr % core::mem::align_of::<AtomicU32>() != 0 {
    return Err(FutexError::InvalidAddress);
  }
  Ok(())
}

/// Block the calling thread on `word` if it still holds `expected`.
///
/// Returns once a [wake] picked this thread. Callers re-check their
/// condition afterwards.
pub fn wait(word: &AtomicU32, expected: u32) -> Result<(), FutexError> {
  let addr = word as *const AtomicU32 as usize;
  check_address(addr)?;
  let current = scheduler::current().ok_or(ThreadError::NotRunning)?;

  interrupts::without_interrupts(|| {
    {
      let mut futex = FUTEX.lock();
      if word.load(Ordering::Acquire) != expected {
        return Err(FutexError::ValueMismatch);
      }
      scheduler::block_current(&current);
      futex.enqueue(addr, current);
    }
    scheduler::schedule();
    Ok(())
  })
}

/// Wake up to `max` threads waiting on `addr`, oldest first. Returns
/// how many were woken.
pub fn wake(addr: usize, max: usize) -> usize {
  if max == 0 {
    return 0;
  }
  let woken = interrupts::without_interrupts(|| FUTEX.lock().dequeue(addr, max));
  for thread in &woken {
    scheduler::unblock(thread);
  }
  woken.len()
}

/// [wake] on the address of `word`.
pub fn wake_word(word: &AtomicU32, max: usize) -> usize {
  wake(word as *const AtomicU32 as usize, max)
}

/// Validate a raw futex address coming from a system call.
pub fn word_at(addr: usize) -> Result<&'static AtomicU32, FutexError> {
  check_address(addr)?;
  // SAFETY: the kernel shares one address space, and the address is
  // non-null and aligned
  Ok(unsafe { &*(addr as *const AtomicU32) })
}

/// Number of threads sleeping on `addr`.
pub fn waiter_count(addr: usize) -> usize {
  interrupts::without_interrupts(|| FUTEX.lock().waiters(addr))
}
