//! Anonymous memory mappings, carved out of the kernel heap.

use super::{SyscallArgs, SyscallError, SyscallResult};
use crate::interrupts::RegisterFrame;
use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::collections::BTreeMap;
use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;

const PAGE_SIZE: u64 = 4096;

/// Mapping flag: changes stay private.
pub const MAP_PRIVATE: u64 = 0x02;
/// Mapping flag: place the mapping exactly at the hint.
pub const MAP_FIXED: u64 = 0x10;
/// Mapping flag: no backing file.
pub const MAP_ANONYMOUS: u64 = 0x20;

/// Live mappings, start address to length.
static MAPPINGS: Mutex<BTreeMap<u64, u64>> = Mutex::new(BTreeMap::new());

fn page_layout(len: u64) -> Result<Layout, SyscallError> {
  if len == 0 {
    return Err(SyscallError::InvalidArgument);
  }
  let len = len
    .checked_add(PAGE_SIZE - 1)
    .ok_or(SyscallError::OutOfMemory)?
    & !(PAGE_SIZE - 1);
  Layout::from_size_align(len as usize, PAGE_SIZE as usize)
    .map_err(|_| SyscallError::OutOfMemory)
}

/// mmap(addr, len, prot, flags, fd, offset): zero-filled, page-aligned
/// anonymous memory. The address hint is ignored.
pub(super) fn sys_mmap(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let flags = args.arg(3);
  if flags & MAP_ANONYMOUS == 0 || flags & MAP_FIXED != 0 {
    return Err(SyscallError::NotSupported);
  }
  let layout = page_layout(args.arg(1))?;

  let start = unsafe { alloc_zeroed(layout) };
  if start.is_null() {
    return Err(SyscallError::OutOfMemory);
  }
  let start = start as u64;
  without_interrupts(|| MAPPINGS.lock().insert(start, layout.size() as u64));
  log::debug!("mapped {} bytes at {:#x}", layout.size(), start);
  Ok(start)
}

/// munmap(addr, len): `addr` and `len` must name a whole mapping.
pub(super) fn sys_munmap(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let start = args.arg(0);
  let layout = page_layout(args.arg(1))?;
  let removed = without_interrupts(|| {
    let mut mappings = MAPPINGS.lock();
    match mappings.get(&start) {
      Some(&len) if len == layout.size() as u64 => mappings.remove(&start),
      _ => None,
    }
  });
  if removed.is_none() {
    return Err(SyscallError::InvalidArgument);
  }

  unsafe { dealloc(start as *mut u8, layout) };
  Ok(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test_case]
  fn test_lengths_round_to_pages() {
    assert_eq!(page_layout(1).unwrap().size(), 4096);
    assert_eq!(page_layout(4096).unwrap().size(), 4096);
    assert_eq!(page_layout(4097).unwrap().size(), 8192);
    assert_eq!(page_layout(0), Err(SyscallError::InvalidArgument));
    assert_eq!(page_layout(u64::MAX), Err(SyscallError::OutOfMemory));
  }
}
