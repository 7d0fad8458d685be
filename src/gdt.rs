//! This module contains the global descriptor table of the kernel
//! and the task state segment that carries the double fault stack.
//!
//! The layout is fixed because the interrupt trampolines load the
//! kernel data selector as an immediate:
//! 0x00 null, 0x08 kernel code, 0x10 kernel data, 0x18 user data,
//! 0x20 user code, 0x28 TSS (two slots).

use lazy_static::lazy_static;
use x86_64::structures::gdt::{
  Descriptor, GlobalDescriptorTable, SegmentSelector,
};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// Index into the TSS interrupt stack table of the double fault stack.
/// Gates encode it one-based.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Selector of the kernel code segment.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Selector of the kernel data segment.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 5;

lazy_static! {
  static ref GDT: (GlobalDescriptorTable, Selectors) = {
    let mut gdt = GlobalDescriptorTable::new();
    let code_selector = gdt.add_entry(Descriptor::kernel_code_segment());
    let data_selector = gdt.add_entry(Descriptor::kernel_data_segment());
    let user_data_selector = gdt.add_entry(Descriptor::user_data_segment());
    let user_code_selector = gdt.add_entry(Descriptor::user_code_segment());
    let tss_selector = gdt.add_entry(Descriptor::tss_segment(&TSS));
    (
      gdt,
      Selectors {
        code_selector,
        data_selector,
        user_data_selector,
        user_code_selector,
        tss_selector,
      },
    )
  };

  static ref TSS: TaskStateSegment = {
    let mut tss = TaskStateSegment::new();
    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
      // the heap may not exist yet when a double fault hits
      static mut STACK: [u8; DOUBLE_FAULT_STACK_SIZE] =
        [0; DOUBLE_FAULT_STACK_SIZE];
      let stack_start = VirtAddr::from_ptr(unsafe { core::ptr::addr_of!(STACK) });
      stack_start + DOUBLE_FAULT_STACK_SIZE
    };
    tss
  };
}

/// Selectors of every descriptor in the [GDT].
#[derive(Debug, Clone, Copy)]
pub struct Selectors {
  /// Ring 0 code segment.
  pub code_selector: SegmentSelector,
  /// Ring 0 data segment.
  pub data_selector: SegmentSelector,
  /// Ring 3 data segment.
  pub user_data_selector: SegmentSelector,
  /// Ring 3 code segment.
  pub user_code_selector: SegmentSelector,
  /// Task state segment.
  pub tss_selector: SegmentSelector,
}

/// Selectors of the loaded table.
pub fn selectors() -> Selectors {
  GDT.1
}

/// Initialize global descriptor table and reload every segment register
/// the kernel relies on.
pub fn init_gdt() {
  use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
  use x86_64::instructions::tables::load_tss;

  let selectors = &GDT.1;
  assert_eq!(selectors.code_selector.0, KERNEL_CODE_SELECTOR);
  assert_eq!(selectors.data_selector.0, KERNEL_DATA_SELECTOR);

  GDT.0.load();

  unsafe {
    CS::set_reg(selectors.code_selector);
    DS::set_reg(selectors.data_selector);
    ES::set_reg(selectors.data_selector);
    SS::set_reg(selectors.data_selector);
    load_tss(selectors.tss_selector);
  }
  log::debug!(
    "gdt loaded: code {:#x} data {:#x} tss {:#x}",
    selectors.code_selector.0,
    selectors.data_selector.0,
    selectors.tss_selector.0
  );
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_user_selectors_carry_rpl3() {
    let selectors = selectors();
    assert_eq!(selectors.user_data_selector.0, 0x18 | 3);
    assert_eq!(selectors.user_code_selector.0, 0x20 | 3);
    assert_eq!(selectors.tss_selector.0, 0x28);
  }

  #[test_case]
  fn test_data_segments_loaded() {
    use x86_64::instructions::segmentation::{Segment, DS, SS};
    assert_eq!(DS::get_reg().0, KERNEL_DATA_SELECTOR);
    assert_eq!(SS::get_reg().0, KERNEL_DATA_SELECTOR);
  }
}
