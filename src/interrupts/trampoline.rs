//! Per-vector interrupt entry stubs.
//!
//! One hand-written template is assembled below. At boot it is copied 256
//! times into a reserved writable and executable region, and every copy
//! gets its two immediates patched: the vector number it pushes and the
//! address of the [InterruptTable](super::table::InterruptTable) slot it
//! calls through. The copies never change after that.
//!
//! Vectors for which the CPU pushes an error code enter their copy past
//! the placeholder `push 0`, so every handler sees the same frame layout.

use super::frame::{FRAME_DS_OFFSET, FRAME_ES_OFFSET};
use super::table::INTERRUPT_TABLE;
use crate::gdt::KERNEL_DATA_SELECTOR;
use conquer_once::spin::OnceCell;
use core::ptr::{addr_of, addr_of_mut};

/// Number of interrupt vectors on x86_64.
pub const VECTOR_COUNT: usize = 256;

core::arch::global_asm!(
  ".pushsection .trampolines, \"awx\", @progbits",
  ".balign 16",
  ".global gate_trampoline_begin",
  ".global gate_trampoline_common",
  ".global gate_trampoline_vector",
  ".global gate_trampoline_slot",
  ".global gate_trampoline_end",
  ".global gate_trampoline_size",
  ".global gate_trampoline_storage",
  "gate_trampoline_begin:",
  // push 0, placeholder error code
  ".byte 0x6a, 0x00",
  "gate_trampoline_common:",
  // push imm32, the vector
  ".byte 0x68",
  "gate_trampoline_vector:",
  ".long 0",
  // es, ds
  "sub rsp, 16",
  "push r15",
  "push r14",
  "push r13",
  "push r12",
  "push r11",
  "push r10",
  "push r9",
  "push r8",
  "push rbp",
  "push rdi",
  "push rsi",
  "push rdx",
  "push rcx",
  "push rbx",
  "push rax",
  "xor eax, eax",
  "mov ax, ds",
  "mov [rsp + {ds}], rax",
  "mov ax, es",
  "mov [rsp + {es}], rax",
  "mov ax, {kernel_data}",
  "mov ds, ax",
  "mov es, ax",
  "cld",
  "mov rdi, rsp",
  "mov rbx, rsp",
  "and rsp, -16",
  // movabs rax, imm64, the slot address
  ".byte 0x48, 0xb8",
  "gate_trampoline_slot:",
  ".quad 0",
  "call qword ptr [rax]",
  "mov rsp, rbx",
  "mov rax, [rsp + {ds}]",
  "mov ds, ax",
  "mov rax, [rsp + {es}]",
  "mov es, ax",
  "pop rax",
  "pop rbx",
  "pop rcx",
  "pop rdx",
  "pop rsi",
  "pop rdi",
  "pop rbp",
  "pop r8",
  "pop r9",
  "pop r10",
  "pop r11",
  "pop r12",
  "pop r13",
  "pop r14",
  "pop r15",
  // ds, es, vector, error code
  "add rsp, 32",
  "iretq",
  "gate_trampoline_end:",
  ".balign 8",
  "gate_trampoline_size:",
  ".quad gate_trampoline_end - gate_trampoline_begin",
  ".balign 16",
  "gate_trampoline_storage:",
  // one copy per vector, sized from the assembled template
  ".space (gate_trampoline_end - gate_trampoline_begin) * {vectors}",
  ".popsection",
  ds = const FRAME_DS_OFFSET,
  es = const FRAME_ES_OFFSET,
  kernel_data = const KERNEL_DATA_SELECTOR,
  vectors = const VECTOR_COUNT,
);

extern "C" {
  static gate_trampoline_begin: u8;
  static gate_trampoline_common: u8;
  static gate_trampoline_vector: u8;
  static gate_trampoline_slot: u8;
  static gate_trampoline_size: u64;
  static mut gate_trampoline_storage: u8;
}

/// Errors that make trampoline generation impossible. All of them are
/// fatal at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrampolineError {
  /// The template reports a length of zero.
  #[error("trampoline template is empty")]
  EmptyTemplate,
  /// The template bytes and the reported length disagree.
  #[error("trampoline template is {actual} bytes, layout says {expected}")]
  LengthMismatch {
    /// Length from the layout.
    expected: usize,
    /// Length of the template bytes.
    actual: usize,
  },
  /// A patch point does not fit inside the template.
  #[error("patch point at offset {offset} overruns template of {len} bytes")]
  PatchOutOfBounds {
    /// Offset of the patch point.
    offset: usize,
    /// Template length.
    len: usize,
  },
  /// The reserved region cannot hold 256 copies.
  #[error("trampoline region holds {available} bytes, {needed} needed")]
  RegionTooSmall {
    /// Bytes needed for all vectors.
    needed: usize,
    /// Bytes reserved.
    available: usize,
  },
  /// [generate] already ran.
  #[error("trampolines were already generated")]
  AlreadyGenerated,
}

/// Where the patch points sit inside the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateLayout {
  /// Template length, which is also the stride between copies.
  pub len: usize,
  /// Entry offset for vectors that push a hardware error code.
  pub common_offset: usize,
  /// Offset of the 32-bit vector immediate.
  pub vector_offset: usize,
  /// Offset of the 64-bit slot-address immediate.
  pub slot_offset: usize,
}

impl TemplateLayout {
  fn validate(&self, template: &[u8]) -> Result<(), TrampolineError> {
    if self.len == 0 {
      return Err(TrampolineError::EmptyTemplate);
    }
    if template.len() != self.len {
      return Err(TrampolineError::LengthMismatch {
        expected: self.len,
        actual: template.len(),
      });
    }
    let patches = [
      (self.common_offset, 1),
      (self.vector_offset, 4),
      (self.slot_offset, 8),
    ];
    for (offset, width) in patches {
      if offset + width > self.len {
        return Err(TrampolineError::PatchOutOfBounds {
          offset,
          len: self.len,
        });
      }
    }
    Ok(())
  }

  /// Read back the vector immediate of a stamped copy.
  pub fn patched_vector(&self, code: &[u8]) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&code[self.vector_offset..self.vector_offset + 4]);
    u32::from_le_bytes(bytes)
  }

  /// Read back the slot-address immediate of a stamped copy.
  pub fn patched_slot(&self, code: &[u8]) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&code[self.slot_offset..self.slot_offset + 8]);
    u64::from_le_bytes(bytes)
  }
}

/// Whether the CPU pushes an error code when delivering `vector`.
pub fn pushes_error_code(vector: u8) -> bool {
  matches!(vector, 8 | 10..=14 | 17 | 21 | 29 | 30)
}

/// Copy `template` once per vector into `region` and patch every copy.
///
/// Returns the entry address of each vector. Copy `v` occupies
/// `region[v * len..(v + 1) * len]`.
pub fn stamp(
  template: &[u8],
  layout: &TemplateLayout,
  region: &mut [u8],
  slot_address: impl Fn(u8) -> u64,
) -> Result<[u64; VECTOR_COUNT], TrampolineError> {
  layout.validate(template)?;
  let needed = layout.len * VECTOR_COUNT;
  if region.len() < needed {
    return Err(TrampolineError::RegionTooSmall {
      needed,
      available: region.len(),
    });
  }

  let base = region.as_ptr() as u64;
  let mut entries = [0u64; VECTOR_COUNT];
  for (vector, code) in region[..needed].chunks_exact_mut(layout.len).enumerate() {
    let vector = vector as u8;
    code.copy_from_slice(template);

    let vector_at = layout.vector_offset;
    code[vector_at..vector_at + 4].copy_from_slice(&u32::from(vector).to_le_bytes());
    let slot_at = layout.slot_offset;
    code[slot_at..slot_at + 8].copy_from_slice(&slot_address(vector).to_le_bytes());

    let entry_offset = if pushes_error_code(vector) {
      layout.common_offset
    } else {
      0
    };
    entries[vector as usize] = base + (vector as usize * layout.len + entry_offset) as u64;
  }
  Ok(entries)
}

struct Generated {
  layout: TemplateLayout,
  entries: [u64; VECTOR_COUNT],
}

static GENERATED: OnceCell<Generated> = OnceCell::uninit();

/// The assembled template and its patch points.
fn template() -> (&'static [u8], TemplateLayout) {
  unsafe {
    let begin = addr_of!(gate_trampoline_begin);
    let offset = |label: *const u8| label as usize - begin as usize;
    let layout = TemplateLayout {
      len: gate_trampoline_size as usize,
      common_offset: offset(addr_of!(gate_trampoline_common)),
      vector_offset: offset(addr_of!(gate_trampoline_vector)),
      slot_offset: offset(addr_of!(gate_trampoline_slot)),
    };
    (core::slice::from_raw_parts(begin, layout.len), layout)
  }
}

/// Bytes reserved for the copies: the template length once per vector.
pub fn region_len() -> usize {
  unsafe { gate_trampoline_size as usize * VECTOR_COUNT }
}

/// Stamp all 256 trampolines. Must run once, before the IDT is built.
pub fn generate() -> Result<&'static [u64; VECTOR_COUNT], TrampolineError> {
  if GENERATED.is_initialized() {
    return Err(TrampolineError::AlreadyGenerated);
  }
  let (template, layout) = template();

  // SAFETY: the region is only written here, before any copy is reachable
  // from the IDT, and GENERATED guards against a second pass
  let region = unsafe {
    core::slice::from_raw_parts_mut(addr_of_mut!(gate_trampoline_storage), region_len())
  };
  let entries = stamp(template, &layout, region, |vector| {
    INTERRUPT_TABLE.slot_address(vector)
  })?;

  GENERATED
    .try_init_once(|| Generated { layout, entries })
    .map_err(|_| TrampolineError::AlreadyGenerated)?;
  log::info!(
    "stamped {} trampolines of {} bytes at {:#x}",
    VECTOR_COUNT,
    layout.len,
    entries[0]
  );

  GENERATED
    .get()
    .map(|generated| &generated.entries)
    .ok_or(TrampolineError::AlreadyGenerated)
}

/// Entry address of the trampoline for `vector`.
pub fn entry(vector: u8) -> Option<u64> {
  GENERATED.get().map(|generated| generated.entries[vector as usize])
}

/// Layout of the generated trampolines.
pub fn layout() -> Option<TemplateLayout> {
  GENERATED.get().map(|generated| generated.layout)
}

/// The stamped bytes of the trampoline for `vector`.
pub fn stamped(vector: u8) -> Option<&'static [u8]> {
  let layout = layout()?;
  let start = vector as usize * layout.len;
  // SAFETY: generation is complete, the region is read-only from here on
  let region =
    unsafe { core::slice::from_raw_parts(addr_of!(gate_trampoline_storage), region_len()) };
  Some(&region[start..start + layout.len])
}
