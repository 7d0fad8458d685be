//! Build-time configuration of the kernel.

use log::LevelFilter;

/// Start address of heap virtual memory
pub const HEAP_START: usize = 0x_4444_4444_0000;
/// Heap size, large enough for the kernel stacks of [MAX_THREADS] threads.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024; // 4 MiB

/// Size of the stack given to every spawned kernel thread.
pub const THREAD_STACK_SIZE: usize = 16 * 1024;
/// Upper bound on live threads, which is also the run queue capacity.
pub const MAX_THREADS: usize = 128;

/// Vector reserved for software-interrupt system calls.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Remapped vector offset of the primary PIC.
pub const PIC_1_OFFSET: u8 = 32;
/// Remapped vector offset of the secondary PIC.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Most verbose level the serial logger emits.
pub const LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
  LevelFilter::Debug
} else {
  LevelFilter::Info
};
