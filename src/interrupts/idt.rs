//! This modules defines the IDT (interrupt descriptor table) type
//! that works with the x86_64 architecture.

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use super::trampoline::VECTOR_COUNT;

/// IDT is just an array of gate descriptors, one for each of the
/// 256 vectors. Vectors 0-31 are the CPU exceptions,
/// see https://wiki.osdev.org/Exceptions for detailed reference.
#[repr(C, align(16))]
pub struct Idt([Entry; VECTOR_COUNT]);

impl Idt {
  /// Create an IDT with every entry missing
  pub fn new() -> Self {
    Self([Entry::missing(); VECTOR_COUNT])
  }

  /// Point the gate for `vector` at `handler`.
  pub fn set_gate(
    &mut self,
    vector: u8,
    selector: SegmentSelector,
    handler: u64,
    options: EntryOptions,
  ) {
    self.0[vector as usize] = Entry::new(selector, handler, options);
  }

  /// The handler address and options of the gate for `vector`.
  pub fn gate(&self, vector: u8) -> (u64, EntryOptions) {
    let entry = self.0[vector as usize];
    (entry.handler_address(), entry.options)
  }

  /// Load the current IDT for cpu to use
  /// * `&'static self` we need self to live for the whole lifetime of the program.
  /// Otherwise, cpu might read freed memory where it thinks the IDT resides.
  pub fn load(&'static self) {
    use core::mem::size_of;
    use x86_64::instructions::tables::{lidt, DescriptorTablePointer};

    let ptr = DescriptorTablePointer {
      base: x86_64::VirtAddr::new(self as *const _ as u64),
      // limit is the maximum-addressible byte, which is size - 1.
      limit: (size_of::<Self>() - 1) as u16,
    };

    unsafe { lidt(&ptr) };
  }
}

impl Default for Idt {
  fn default() -> Self {
    Self::new()
  }
}

/// A 16-byte gate descriptor. The handler address is split across
/// `pointer_low`, `pointer_middle` and `pointer_high` around the code
/// selector and the [EntryOptions].
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Entry {
  pointer_low: u16,
  gdt_selector: SegmentSelector,
  options: EntryOptions,
  pointer_middle: u16,
  pointer_high: u32,
  reserved: u32,
}

impl Entry {
  /// Create a new IDT entry
  pub fn new(
    gdt_selector: SegmentSelector,
    pointer: u64,
    options: EntryOptions,
  ) -> Self {
    Entry {
      gdt_selector,
      pointer_low: pointer as u16,
      pointer_middle: (pointer >> 16) as u16,
      pointer_high: (pointer >> 32) as u32,
      options,
      reserved: 0,
    }
  }

  fn missing() -> Self {
    Entry {
      gdt_selector: SegmentSelector::new(0, PrivilegeLevel::Ring0),
      pointer_low: 0,
      pointer_middle: 0,
      pointer_high: 0,
      options: EntryOptions::minimal(),
      reserved: 0,
    }
  }

  fn handler_address(&self) -> u64 {
    let (low, middle, high) =
      (self.pointer_low, self.pointer_middle, self.pointer_high);
    u64::from(low) | u64::from(middle) << 16 | u64::from(high) << 32
  }
}

/// The 16-bit type-and-attributes word of a gate: IST index in bits 0-2,
/// gate type in bits 8-11 (interrupt gate when bit 8 is clear), DPL in
/// bits 13-14 and the present flag in bit 15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions(u16);

const MINIMAL_VALID_OPTION: u16 = 0b0000111000000000;

impl EntryOptions {
  /// Create a new option with all 0s except must-1 bits
  pub const fn minimal() -> Self {
    EntryOptions(MINIMAL_VALID_OPTION)
  }

  /// Create a new option with reasonable default.
  /// Present -> True
  /// Disable Interrupts -> True
  pub fn new() -> Self {
    let mut opt = Self::minimal();
    opt.set_present(true).disable_interrupts(true);
    opt
  }

  /// Set the present bit of the option.
  pub fn set_present(&mut self, present: bool) -> &mut Self {
    if present {
      self.0 |= 1 << 15;
    } else {
      self.0 &= !(1 << 15);
    }

    self
  }

  /// Set the interrupt gate bit.
  pub fn disable_interrupts(&mut self, disable: bool) -> &mut Self {
    if disable {
      self.0 &= !(1 << 8);
    } else {
      self.0 |= 1 << 8;
    }

    self
  }

  /// Set privilege level.
  pub fn set_privilege_level(&mut self, dpl: u16) -> &mut Self {
    if dpl >= 4 {
      panic!("Invalid privilege: {}", dpl);
    }
    self.0 = (self.0 & 0x9fff) | (dpl << 13);

    self
  }

  /// Set stack index, one-based: 0 keeps the current stack.
  pub fn set_stack_index(&mut self, index: u16) -> &mut Self {
    if index >= 8 {
      panic!("Invalid stack index {}", index);
    }
    self.0 = (self.0 & 0xfff8) | index;

    self
  }

  /// Descriptor privilege level.
  pub fn privilege_level(&self) -> u16 {
    (self.0 >> 13) & 0b11
  }

  /// One-based interrupt stack table index.
  pub fn stack_index(&self) -> u16 {
    self.0 & 0b111
  }

  /// Whether the gate is present.
  pub fn is_present(&self) -> bool {
    self.0 & (1 << 15) != 0
  }
}

impl Default for EntryOptions {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_trampoline_gate_options() {
    let mut opt = EntryOptions::new();
    assert!(opt.is_present());
    assert_eq!(opt.privilege_level(), 0);
    opt.set_privilege_level(3).set_stack_index(1);
    assert_eq!(opt.privilege_level(), 3);
    assert_eq!(opt.stack_index(), 1);
    assert!(opt.is_present());
  }

  #[test_case]
  fn test_gate_round_trip() {
    let mut idt = Idt::new();
    let mut options = EntryOptions::new();
    options.set_stack_index(1);
    idt.set_gate(8, SegmentSelector(0x08), 0xffff_8000_dead_beef, options);

    let (address, read_back) = idt.gate(8);
    assert_eq!(address, 0xffff_8000_dead_beef);
    assert_eq!(read_back, options);
    assert!(!idt.gate(9).1.is_present());
  }
}
