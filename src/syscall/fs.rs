//! File and descriptor system calls. There is no filesystem: only the
//! console descriptors can be written.

use super::{user_bytes, SyscallArgs, SyscallError, SyscallNumber, SyscallResult};
use crate::interrupts::RegisterFrame;
use crate::serial;

const STDOUT: u64 = 1;
const STDERR: u64 = 2;

/// write(fd, buf, len)
pub(super) fn sys_write(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  match args.arg(0) {
    STDOUT | STDERR => {
      let bytes = user_bytes(args.arg(1), args.arg(2))?;
      serial::write_bytes(bytes);
      Ok(bytes.len() as u64)
    }
    _ => Err(SyscallError::BadDescriptor),
  }
}

pub(super) fn sys_unsupported(args: &SyscallArgs, _: &mut RegisterFrame) -> SyscallResult {
  let name = SyscallNumber::try_from(args.number).map_or("?", SyscallNumber::name);
  log::debug!("system call {} is not supported", name);
  Err(SyscallError::NotSupported)
}
