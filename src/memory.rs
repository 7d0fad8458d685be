//! This module contains the kernel's virtual memory setup: the page
//! table mapper over the bootloader's physical memory window and the
//! frame allocator fed from its memory map.

use bootloader::bootinfo::{MemoryMap, MemoryRegionType};
use x86_64::structures::paging::{
  FrameAllocator, OffsetPageTable, PageTable, PhysFrame, Size4KiB,
};
use x86_64::{PhysAddr, VirtAddr};

const FRAME_SIZE: u64 = 4096;

/// Initialize a new [OffsetPageTable].
///
/// # Safety
/// The complete physical memory must be mapped at `physical_memory_offset`,
/// and this must be called once, so that no two `&mut` references to the
/// active level 4 table exist.
pub unsafe fn init_offset_page_table(
  physical_memory_offset: VirtAddr,
) -> OffsetPageTable<'static> {
  unsafe {
    let level_4_table = active_level4_page_table(physical_memory_offset);
    OffsetPageTable::new(level_4_table, physical_memory_offset)
  }
}

unsafe fn active_level4_page_table(
  physical_memory_offset: VirtAddr,
) -> &'static mut PageTable {
  use x86_64::registers::control::Cr3;

  let (level_4_table_frame, _) = Cr3::read();
  let virt = physical_memory_offset + level_4_table_frame.start_address().as_u64();
  let page_table_ptr: *mut PageTable = virt.as_mut_ptr();

  unsafe { &mut *page_table_ptr }
}

/// A FrameAllocator that hands out the usable frames of the bootloader's
/// memory map in order, never reusing one.
pub struct BootInfoFrameAllocator {
  memory_map: &'static MemoryMap,
  region: usize,
  next_addr: u64,
}

impl BootInfoFrameAllocator {
  /// Create a FrameAllocator from the passed memory map.
  ///
  /// # Safety
  /// Every frame marked `Usable` in the map must really be unused.
  pub unsafe fn init(memory_map: &'static MemoryMap) -> Self {
    BootInfoFrameAllocator {
      memory_map,
      region: 0,
      next_addr: 0,
    }
  }
}

unsafe impl FrameAllocator<Size4KiB> for BootInfoFrameAllocator {
  fn allocate_frame(&mut self) -> Option<PhysFrame> {
    while let Some(region) = self.memory_map.get(self.region) {
      if region.region_type == MemoryRegionType::Usable {
        let start = region.range.start_addr().max(self.next_addr);
        if start + FRAME_SIZE <= region.range.end_addr() {
          self.next_addr = start + FRAME_SIZE;
          return Some(PhysFrame::containing_address(PhysAddr::new(start)));
        }
      }
      self.region += 1;
    }
    None
  }
}
