//! The main binary of gate_os

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(gate_os::test_harness::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::{entry_point, BootInfo};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};
use gate_os::syscall::{abi, SyscallNumber};
use gate_os::thread::{self, futex};

// register [kernel_main] as the entry point called by bootloader.
entry_point!(kernel_main);

/// Rounds each of the two ping-pong threads plays.
const ROUNDS: u32 = 8;

/// Whose turn it is: even for thread 0, odd for thread 1.
static TURN: AtomicU32 = AtomicU32::new(0);

/// Take turns with the other player through the futex on [TURN].
fn ping_pong(player: usize) -> usize {
  for _ in 0..ROUNDS {
    loop {
      let turn = TURN.load(Ordering::Acquire);
      if turn as usize % 2 == player {
        break;
      }
      let _ = futex::wait(&TURN, turn);
    }
    log::info!("player {} at turn {}", player, TURN.load(Ordering::Relaxed));
    TURN.fetch_add(1, Ordering::AcqRel);
    futex::wake_word(&TURN, 1);
  }
  player + 100
}

/// The [bootloader] we use passes in [BootInfo] to the start procedure.
/// It contains an overview of the memory layout of the system
/// and an offset from which physical addresses start.
fn kernel_main(boot_info: &'static BootInfo) -> ! {
  if let Err(error) = gate_os::init(boot_info) {
    panic!("kernel init failed: {}", error);
  }

  #[cfg(test)]
  test_main();

  let banner = b"gate_os up, system calls online\n";
  unsafe {
    abi::syscall3(
      SyscallNumber::Write,
      1,
      banner.as_ptr() as u64,
      banner.len() as u64,
    );
  }

  let players = [thread::spawn(ping_pong, 0, false), thread::spawn(ping_pong, 1, false)];
  for player in players {
    match player.and_then(thread::join) {
      Ok(value) => log::info!("player finished with {}", value),
      Err(error) => log::error!("player failed: {}", error),
    }
  }
  log::info!("{} turns played, idling", TURN.load(Ordering::Relaxed));

  #[cfg(test)]
  gate_os::test_harness::exit_qemu(gate_os::test_harness::QemuExitCode::Success);

  gate_os::hlt_loop();
}

/// This function is called on panic.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
  x86_64::instructions::interrupts::disable();
  log::error!("KERNEL PANIC: {}", info);
  gate_os::hlt_loop();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
  gate_os::test_harness::test_panic_handler(info)
}
