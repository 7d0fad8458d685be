//! Signals, delivered by redirecting the frame of a returning system
//! call into a registered entry stub.
//!
//! The entry stub receives the signal number in RDI and the handler in
//! RSI. It calls the handler and issues `sigreturn`, which puts back the
//! frame saved at delivery.

use super::{scheduler, ThreadId};
use crate::interrupts::RegisterFrame;
use crate::syscall::{SyscallError, SyscallNumber};
use alloc::vec::Vec;
use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;

/// Number of signals, numbered from 1.
pub const SIGNAL_COUNT: u32 = 64;
/// Cannot be caught, ignored or masked.
pub const SIGKILL: u32 = 9;
/// Raw handler value of [SignalAction::Default].
pub const SIG_DFL: u64 = 0;
/// Raw handler value of [SignalAction::Ignore].
pub const SIG_IGN: u64 = 1;

/// `sigprocmask` operation: add the set to the mask.
pub const SIG_BLOCK: u64 = 0;
/// `sigprocmask` operation: remove the set from the mask.
pub const SIG_UNBLOCK: u64 = 1;
/// `sigprocmask` operation: replace the mask.
pub const SIG_SETMASK: u64 = 2;

/// Bytes skipped below the interrupted stack pointer on delivery.
const RED_ZONE: u64 = 128;

/// What a delivered signal does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
  /// Terminate the thread with exit value `128 + signal`.
  Default,
  /// Drop the signal.
  Ignore,
  /// Run the handler at this address through the entry stub.
  Handler(u64),
}

impl SignalAction {
  /// Decode the handler argument of `sigaction`.
  pub fn from_raw(raw: u64) -> Self {
    match raw {
      SIG_DFL => SignalAction::Default,
      SIG_IGN => SignalAction::Ignore,
      address => SignalAction::Handler(address),
    }
  }

  /// Encode for the old-action output of `sigaction`.
  pub fn to_raw(self) -> u64 {
    match self {
      SignalAction::Default => SIG_DFL,
      SignalAction::Ignore => SIG_IGN,
      SignalAction::Handler(address) => address,
    }
  }
}

struct SignalTable {
  actions: [SignalAction; SIGNAL_COUNT as usize],
  entry: Option<u64>,
}

static SIGNALS: Mutex<SignalTable> = Mutex::new(SignalTable {
  actions: [SignalAction::Default; SIGNAL_COUNT as usize],
  entry: None,
});

/// Per-thread signal bookkeeping.
#[derive(Debug, Default)]
pub struct SignalState {
  pending: u64,
  mask: u64,
  /// Frames and masks saved at delivery, innermost last.
  saved: Vec<(RegisterFrame, u64)>,
}

impl SignalState {
  /// Nothing pending, nothing masked.
  pub const fn new() -> Self {
    SignalState {
      pending: 0,
      mask: 0,
      saved: Vec::new(),
    }
  }

  /// Take the lowest pending signal that is not masked.
  fn take_deliverable(&mut self) -> Option<u32> {
    let deliverable = self.pending & !self.mask;
    if deliverable == 0 {
      return None;
    }
    let bit = deliverable.trailing_zeros();
    self.pending &= !(1 << bit);
    Some(bit + 1)
  }
}

fn bit(signal: u32) -> u64 {
  1 << (signal - 1)
}

fn check_signal(signal: u64) -> Result<u32, SyscallError> {
  match u32::try_from(signal) {
    Ok(signal) if (1..=SIGNAL_COUNT).contains(&signal) => Ok(signal),
    _ => Err(SyscallError::InvalidArgument),
  }
}

/// Install `action` for `signal`, returning the previous one.
pub fn set_action(signal: u64, action: SignalAction) -> Result<SignalAction, SyscallError> {
  let signal = check_signal(signal)?;
  if signal == SIGKILL {
    return Err(SyscallError::InvalidArgument);
  }
  Ok(without_interrupts(|| {
    let mut table = SIGNALS.lock();
    core::mem::replace(&mut table.actions[signal as usize - 1], action)
  }))
}

/// Register the entry stub handlers run through.
pub fn set_entry(entry: u64) -> Result<(), SyscallError> {
  if entry == 0 {
    return Err(SyscallError::InvalidArgument);
  }
  without_interrupts(|| SIGNALS.lock().entry = Some(entry));
  Ok(())
}

/// Address of the kernel's own entry stub.
pub fn kernel_entry() -> u64 {
  gate_signal_entry as usize as u64
}

/// Change the calling thread's mask, returning the previous one.
pub fn set_mask(how: u64, set: u64) -> Result<u64, SyscallError> {
  let current = scheduler::current().ok_or(SyscallError::NoSuchThread)?;
  without_interrupts(|| {
    let mut state = current.signals.lock();
    let old = state.mask;
    let mask = match how {
      SIG_BLOCK => old | set,
      SIG_UNBLOCK => old & !set,
      SIG_SETMASK => set,
      _ => return Err(SyscallError::InvalidArgument),
    };
    state.mask = mask & !bit(SIGKILL);
    Ok(old)
  })
}

/// Mark `signal` pending on thread `target`. Signal 0 only checks that
/// the thread exists.
pub fn send(target: ThreadId, signal: u64) -> Result<(), SyscallError> {
  let thread = scheduler::lookup(target).ok_or(SyscallError::NoSuchThread)?;
  if signal == 0 {
    return Ok(());
  }
  let signal = check_signal(signal)?;
  without_interrupts(|| thread.signals.lock().pending |= bit(signal));
  log::debug!("signal {} sent to thread {}", signal, target);
  Ok(())
}

/// Deliver the next pending signal of the calling thread into `frame`.
/// Runs on the way out of the system call vector, interrupts masked.
///
/// Ignored signals are dropped; a signal whose action is the default, or
/// a handler with no entry stub registered, ends the thread. At most one
/// handler is set up per call.
pub fn deliver_pending(frame: &mut RegisterFrame) {
  let current = match scheduler::current() {
    Some(current) => current,
    None => return,
  };

  loop {
    let signal = match current.signals.lock().take_deliverable() {
      Some(signal) => signal,
      None => return,
    };
    let (action, entry) = {
      let table = SIGNALS.lock();
      (table.actions[signal as usize - 1], table.entry)
    };

    match (action, entry) {
      (SignalAction::Ignore, _) => continue,
      (SignalAction::Handler(handler), Some(entry)) => {
        let mut state = current.signals.lock();
        let mask = state.mask;
        state.saved.push((*frame, mask));
        state.mask = mask | bit(signal);

        frame.rip = entry;
        frame.rdi = u64::from(signal);
        frame.rsi = handler;
        frame.rsp = ((frame.rsp - RED_ZONE) & !0xf) - 8;
        return;
      }
      _ => {
        log::info!("thread {} terminated by signal {}", current.id(), signal);
        drop(current);
        super::exit(128 + signal as usize);
      }
    }
  }
}

/// Put back the frame and mask saved by the innermost delivery.
pub fn restore(frame: &mut RegisterFrame) -> Result<(), SyscallError> {
  let current = scheduler::current().ok_or(SyscallError::NoSuchThread)?;
  without_interrupts(|| {
    let mut state = current.signals.lock();
    let (saved, mask) = state.saved.pop().ok_or(SyscallError::InvalidArgument)?;
    *frame = saved;
    state.mask = mask;
    Ok(())
  })
}

core::arch::global_asm!(
  ".global gate_signal_entry",
  // entered as if called: rdi = signal, rsi = handler
  "gate_signal_entry:",
  "sub rsp, 8",
  "call rsi",
  "mov eax, {sigreturn}",
  "int {vector}",
  "ud2",
  sigreturn = const SyscallNumber::Sigreturn as u64,
  vector = const crate::config::SYSCALL_VECTOR,
);

extern "C" {
  fn gate_signal_entry();
}
