//! Kernel stacks and the callee-saved context switch.

use super::ThreadStart;
use alloc::vec::Vec;
use core::mem::size_of;

core::arch::global_asm!(
  ".global gate_switch_context",
  ".global gate_thread_start",
  // rdi: where to save the outgoing stack pointer
  // rsi: stack pointer to resume
  "gate_switch_context:",
  "push rbp",
  "push rbx",
  "push r12",
  "push r13",
  "push r14",
  "push r15",
  "pushfq",
  "mov [rdi], rsp",
  "mov rsp, rsi",
  "popfq",
  "pop r15",
  "pop r14",
  "pop r13",
  "pop r12",
  "pop rbx",
  "pop rbp",
  "ret",
  // first return target of every new thread, see InitialStack
  "gate_thread_start:",
  "mov rdi, r12",
  "call {entry}",
  "ud2",
  entry = sym super::scheduler::thread_entry,
);

extern "C" {
  fn gate_switch_context(save_rsp: *mut u64, resume_rsp: u64);
  fn gate_thread_start();
}

/// Save the callee-saved state on the current stack, store the stack
/// pointer into `save_rsp` and resume the context saved at `resume_rsp`.
///
/// # Safety
/// `resume_rsp` must come from an earlier switch or [KernelStack::prepare],
/// and its stack must stay allocated until the thread is switched away.
pub unsafe fn switch_context(save_rsp: *mut u64, resume_rsp: u64) {
  unsafe { gate_switch_context(save_rsp, resume_rsp) }
}

/// What `gate_switch_context` pops when it resumes a thread for the
/// first time, lowest address first.
#[repr(C)]
struct InitialStack {
  rflags: u64,
  r15: u64,
  r14: u64,
  r13: u64,
  r12: u64,
  rbx: u64,
  rbp: u64,
  ret: u64,
}

/// Room for the [ThreadStart] above the first frame, kept 16-byte aligned.
const START_BLOCK: u64 = ((size_of::<ThreadStart>() + 15) & !15) as u64;

/// Interrupts stay masked until the thread has finished its first switch.
const INITIAL_RFLAGS: u64 = 0x2;

/// Stack a kernel thread runs on.
pub struct KernelStack {
  memory: Vec<u128>,
}

impl KernelStack {
  /// Allocate a stack of at least `size` bytes, or `None` when the heap
  /// is exhausted.
  pub fn new(size: usize) -> Option<Self> {
    let words = size / size_of::<u128>();
    let mut memory = Vec::new();
    memory.try_reserve_exact(words).ok()?;
    memory.resize(words, 0);
    Some(KernelStack { memory })
  }

  /// One past the highest usable byte, 16-byte aligned.
  pub fn top(&self) -> u64 {
    self.memory.as_ptr_range().end as u64
  }

  /// Store `start` at the top of the stack and lay out the first switch
  /// frame below it, so that resuming the frame enters
  /// `gate_thread_start` with a pointer to `start` in r12. Returns the
  /// stack pointer to resume.
  pub fn prepare(&mut self, start: ThreadStart) -> u64 {
    let start_at = self.top() - START_BLOCK;
    unsafe { (start_at as *mut ThreadStart).write(start) };

    let initial = InitialStack {
      rflags: INITIAL_RFLAGS,
      r15: 0,
      r14: 0,
      r13: 0,
      r12: start_at,
      rbx: 0,
      rbp: 0,
      ret: gate_thread_start as usize as u64,
    };
    // once `ret` pops the last word the stack pointer sits on
    // `start_at`, 16-byte aligned for the call in `gate_thread_start`
    let rsp = start_at - size_of::<InitialStack>() as u64;
    unsafe { (rsp as *mut InitialStack).write(initial) };
    rsp
  }

  /// Whether `address` lies on this stack.
  pub fn contains(&self, address: u64) -> bool {
    let range = self.memory.as_ptr_range();
    (range.start as u64..range.end as u64).contains(&address)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_prepared_stack_layout() {
    fn entry(arg: usize) -> usize {
      arg
    }

    let mut stack = KernelStack::new(4096).unwrap();
    let rsp = stack.prepare(ThreadStart { entry, arg: 0xabcd });
    assert_eq!(stack.top() % 16, 0);
    assert_eq!(rsp, stack.top() - START_BLOCK - 64);
    assert_eq!((rsp + 64) % 16, 0);
    assert!(stack.contains(rsp));

    let words = unsafe { core::slice::from_raw_parts(rsp as *const u64, 8) };
    assert_eq!(words[0], INITIAL_RFLAGS);
    assert_eq!(words[4], rsp + 64);
    assert_eq!(words[7], gate_thread_start as usize as u64);
    let start = unsafe { &*((rsp + 64) as *const ThreadStart) };
    assert_eq!(start.arg, 0xabcd);
  }
}
