//! The register frame every trampoline builds on the stack before it
//! calls into the handler table.
//!
//! The trampoline pushes from the highest field down (the CPU pushes
//! `ss` through `rip`, the trampoline the rest) and pops in the mirrored
//! order, so the struct below is the exact memory image at the handler's
//! first argument.

use core::mem::{offset_of, size_of};

/// Snapshot of the interrupted context.
///
/// Every field a handler writes is what the interrupted code resumes
/// with, the segment selectors included.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterFrame {
  /// Syscall number on entry, return value on exit.
  pub rax: u64,
  #[allow(missing_docs)]
  pub rbx: u64,
  #[allow(missing_docs)]
  pub rcx: u64,
  /// Third syscall argument.
  pub rdx: u64,
  /// Second syscall argument.
  pub rsi: u64,
  /// First syscall argument.
  pub rdi: u64,
  #[allow(missing_docs)]
  pub rbp: u64,
  /// Fifth syscall argument.
  pub r8: u64,
  /// Sixth syscall argument.
  pub r9: u64,
  /// Fourth syscall argument.
  pub r10: u64,
  #[allow(missing_docs)]
  pub r11: u64,
  #[allow(missing_docs)]
  pub r12: u64,
  #[allow(missing_docs)]
  pub r13: u64,
  #[allow(missing_docs)]
  pub r14: u64,
  #[allow(missing_docs)]
  pub r15: u64,
  /// Data segment selector of the interrupted code.
  pub ds: u64,
  /// Extra segment selector of the interrupted code.
  pub es: u64,
  /// Vector this frame was taken through.
  pub vector: u64,
  /// Hardware error code, zero for vectors that do not push one.
  pub error_code: u64,
  /// Resume address.
  pub rip: u64,
  /// Code selector of the interrupted code.
  pub cs: u64,
  #[allow(missing_docs)]
  pub rflags: u64,
  /// Stack pointer of the interrupted code.
  pub rsp: u64,
  /// Stack selector of the interrupted code.
  pub ss: u64,
}

/// Size of [RegisterFrame] in bytes.
pub const FRAME_SIZE: usize = 192;
/// Offset of the saved DS selector, used by the trampoline template.
pub const FRAME_DS_OFFSET: usize = 120;
/// Offset of the saved ES selector, used by the trampoline template.
pub const FRAME_ES_OFFSET: usize = 128;

const _: () = {
  assert!(size_of::<RegisterFrame>() == FRAME_SIZE);
  assert!(offset_of!(RegisterFrame, rax) == 0);
  assert!(offset_of!(RegisterFrame, r15) == 112);
  assert!(offset_of!(RegisterFrame, ds) == FRAME_DS_OFFSET);
  assert!(offset_of!(RegisterFrame, es) == FRAME_ES_OFFSET);
  assert!(offset_of!(RegisterFrame, vector) == 136);
  assert!(offset_of!(RegisterFrame, error_code) == 144);
  assert!(offset_of!(RegisterFrame, rip) == 152);
  assert!(offset_of!(RegisterFrame, ss) == 184);
};

impl RegisterFrame {
  /// Whether the interrupted code ran in ring 3.
  pub fn is_user_mode(&self) -> bool {
    self.cs & 0b11 == 3
  }

  /// The system call number, taken from RAX.
  pub fn syscall_number(&self) -> u64 {
    self.rax
  }

  /// The six system call arguments in calling convention order.
  pub fn syscall_args(&self) -> [u64; 6] {
    [self.rdi, self.rsi, self.rdx, self.r10, self.r8, self.r9]
  }

  /// Set the value the interrupted code sees in RAX.
  pub fn set_return(&mut self, value: u64) {
    self.rax = value;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_syscall_args_order() {
    let frame = RegisterFrame {
      rax: 5,
      rdi: 1,
      rsi: 2,
      rdx: 3,
      r10: 4,
      r8: 5,
      r9: 6,
      rcx: 99,
      ..RegisterFrame::default()
    };
    assert_eq!(frame.syscall_number(), 5);
    assert_eq!(frame.syscall_args(), [1, 2, 3, 4, 5, 6]);
  }

  #[test_case]
  fn test_user_mode_from_cs() {
    let mut frame = RegisterFrame::default();
    frame.cs = 0x08;
    assert!(!frame.is_user_mode());
    frame.cs = 0x23;
    assert!(frame.is_user_mode());
  }
}
