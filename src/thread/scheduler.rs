//! Round-robin scheduler over the kernel threads.
//!
//! Only runnable threads sit in the run queue. A blocked thread is owned
//! by the futex queue it sleeps on until a wake makes it runnable again.
//! Every path that touches the scheduler runs with interrupts masked.

use super::context::switch_context;
use super::{Thread, ThreadError, ThreadId, ThreadStart, ThreadState};
use crate::config::MAX_THREADS;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_queue::ArrayQueue;
use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::interrupts;

struct Scheduler {
  threads: BTreeMap<ThreadId, Arc<Thread>>,
  current: Option<Arc<Thread>>,
  idle: Option<Arc<Thread>>,
  /// The thread switched away from, kept alive until the switch is done.
  retiring: Option<Arc<Thread>>,
}

lazy_static! {
  static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler {
    threads: BTreeMap::new(),
    current: None,
    idle: None,
    retiring: None,
  });
  static ref RUN_QUEUE: ArrayQueue<ThreadId> = ArrayQueue::new(MAX_THREADS);
}

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Whether threads are being scheduled.
pub fn is_running() -> bool {
  RUNNING.load(Ordering::Acquire)
}

pub(super) fn init() -> Result<(), ThreadError> {
  interrupts::without_interrupts(|| {
    if is_running() {
      return Ok(());
    }
    let bootstrap = Arc::new(Thread::bootstrap());
    assert_eq!(bootstrap.id, ThreadId::BOOTSTRAP);
    let idle = Arc::new(Thread::spawn(
      ThreadStart {
        entry: idle_loop,
        arg: 0,
      },
      false,
    )?);

    let mut scheduler = SCHEDULER.lock();
    scheduler.threads.insert(bootstrap.id, bootstrap.clone());
    scheduler.threads.insert(idle.id, idle.clone());
    scheduler.current = Some(bootstrap);
    scheduler.idle = Some(idle);
    RUNNING.store(true, Ordering::Release);
    log::info!("scheduler running, run queue holds {} threads", MAX_THREADS);
    Ok(())
  })
}

fn idle_loop(_: usize) -> usize {
  loop {
    x86_64::instructions::hlt();
    schedule();
  }
}

/// Register a freshly created thread and queue it.
pub(super) fn add(thread: Thread) -> Result<ThreadId, ThreadError> {
  if !is_running() {
    return Err(ThreadError::NotRunning);
  }
  let thread = Arc::new(thread);
  let id = thread.id;
  interrupts::without_interrupts(|| {
    let mut scheduler = SCHEDULER.lock();
    if scheduler.threads.len() >= MAX_THREADS {
      return Err(ThreadError::TooManyThreads);
    }
    RUN_QUEUE
      .push(id)
      .map_err(|_| ThreadError::TooManyThreads)?;
    scheduler.threads.insert(id, thread);
    Ok(())
  })?;
  log::debug!("thread {} spawned", id);
  Ok(id)
}

/// Look up a thread that has not been joined yet.
pub fn lookup(id: ThreadId) -> Option<Arc<Thread>> {
  interrupts::without_interrupts(|| SCHEDULER.lock().threads.get(&id).cloned())
}

pub(super) fn remove(id: ThreadId) -> Option<Arc<Thread>> {
  interrupts::without_interrupts(|| SCHEDULER.lock().threads.remove(&id))
}

/// The thread on the CPU.
pub fn current() -> Option<Arc<Thread>> {
  interrupts::without_interrupts(|| SCHEDULER.lock().current.clone())
}

/// Number of threads not joined yet, idle and bootstrap included.
pub fn thread_count() -> usize {
  interrupts::without_interrupts(|| SCHEDULER.lock().threads.len())
}

/// Make a blocked thread runnable. Returns false if it was not blocked.
pub(super) fn unblock(thread: &Thread) -> bool {
  if !thread.transition(ThreadState::Blocked, ThreadState::Runnable) {
    return false;
  }
  if RUN_QUEUE.push(thread.id).is_err() {
    // capacity matches MAX_THREADS, so every live thread fits
    panic!("run queue overflow waking thread {}", thread.id);
  }
  true
}

/// Mark the calling thread blocked. It stops being scheduled at the next
/// [schedule] until [unblock] is called on it.
pub(super) fn block_current(current: &Thread) {
  current.set_state(ThreadState::Blocked);
}

/// Preemption point of the timer interrupt.
pub fn preempt() {
  if is_running() {
    schedule();
  }
}

/// Switch to the next runnable thread. A running caller goes to the back
/// of the run queue; a blocked or exited one stays off it.
pub fn schedule() {
  interrupts::without_interrupts(|| {
    let (save, resume) = {
      let mut scheduler = SCHEDULER.lock();
      let current = match scheduler.current.take() {
        Some(current) => current,
        None => return,
      };
      let idle = scheduler.idle.clone();
      let is_idle = idle.as_ref().map_or(false, |idle| Arc::ptr_eq(idle, &current));

      if current.transition(ThreadState::Running, ThreadState::Runnable) && !is_idle {
        if RUN_QUEUE.push(current.id).is_err() {
          panic!("run queue overflow requeueing thread {}", current.id);
        }
      }

      let next = loop {
        match RUN_QUEUE.pop() {
          Ok(id) => match scheduler.threads.get(&id) {
            Some(thread) if thread.state() == ThreadState::Runnable => {
              break thread.clone()
            }
            _ => continue,
          },
          Err(_) => match idle {
            Some(idle) => break idle,
            None => break current.clone(),
          },
        }
      };

      next.set_state(ThreadState::Running);
      if Arc::ptr_eq(&next, &current) {
        scheduler.current = Some(current);
        return;
      }

      let save = current.context.get();
      let resume = unsafe { *next.context.get() };
      scheduler.current = Some(next);
      scheduler.retiring = Some(current);
      (save, resume)
    };

    unsafe { switch_context(save, resume) };
    finish_switch();
  });
}

/// Drop the reference to the thread that was just switched away from.
fn finish_switch() {
  let retired = SCHEDULER.lock().retiring.take();
  drop(retired);
}

/// First Rust code a new thread runs, reached from `gate_thread_start`.
pub(crate) extern "C" fn thread_entry(start: *mut ThreadStart) -> ! {
  finish_switch();
  let ThreadStart { entry, arg } = unsafe { start.read() };
  interrupts::enable();
  let value = entry(arg);
  super::exit(value)
}
