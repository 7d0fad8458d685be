//! This module contains the kernel's heap memory allocator.

use crate::config::{HEAP_SIZE, HEAP_START};
use alloc::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use linked_list_allocator::Heap;
use x86_64::{
  instructions::interrupts,
  structures::paging::{
    mapper::MapToError, FrameAllocator, Mapper, Page, PageTableFlags, Size4KiB,
  },
  VirtAddr,
};

/// Initialize kernel's heap memory area by mapping all pages
/// in kernel's [HEAP_START, HEAP_START + HEAP_SIZE] range to
/// physical frames.
pub fn init_heap(
  mapper: &mut impl Mapper<Size4KiB>,
  frame_allocator: &mut impl FrameAllocator<Size4KiB>,
) -> Result<(), MapToError<Size4KiB>> {
  let page_range = {
    let heap_start = VirtAddr::new(HEAP_START as u64);
    let heap_end = heap_start + HEAP_SIZE - 1u64;
    let heap_start_page = Page::containing_address(heap_start);
    let heap_end_page = Page::containing_address(heap_end);
    Page::range_inclusive(heap_start_page, heap_end_page)
  };

  for page in page_range {
    let frame = frame_allocator
      .allocate_frame()
      .ok_or(MapToError::FrameAllocationFailed)?;
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
    unsafe { mapper.map_to(page, frame, flags, frame_allocator)?.flush() };
  }

  unsafe {
    ALLOCATOR.init(HEAP_START, HEAP_SIZE);
  }
  log::info!("heap ready: {} KiB at {:#x}", HEAP_SIZE / 1024, HEAP_START);

  Ok(())
}

/// Bytes currently handed out by the heap.
pub fn used_bytes() -> usize {
  ALLOCATOR.used()
}

#[global_allocator]
static ALLOCATOR: Locked<Heap> = Locked::new(Heap::empty());

/// A wrapper around [spin::Mutex] to permit trait implementations.
///
/// The lock is only ever taken with interrupts masked: a thread preempted
/// while holding it would otherwise deadlock the next thread that allocates.
pub struct Locked<A> {
  inner: spin::Mutex<A>,
}

impl<A> Locked<A> {
  /// Create a new instance
  pub const fn new(inner: A) -> Self {
    Locked {
      inner: spin::Mutex::new(inner),
    }
  }

  /// Run `f` on the inner value with interrupts masked.
  fn with<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
    interrupts::without_interrupts(|| f(&mut self.inner.lock()))
  }
}

impl Locked<Heap> {
  unsafe fn init(&self, start: usize, size: usize) {
    self.with(|heap| unsafe { heap.init(start, size) })
  }

  fn used(&self) -> usize {
    self.with(|heap| heap.used())
  }
}

unsafe impl GlobalAlloc for Locked<Heap> {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    self.with(|heap| {
      heap
        .allocate_first_fit(layout)
        .map_or(ptr::null_mut(), |block| block.as_ptr())
    })
  }

  unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
    if let Some(block) = NonNull::new(ptr) {
      self.with(|heap| unsafe { heap.deallocate(block, layout) })
    }
  }
}
