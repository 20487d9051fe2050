//! The file-descriptor system calls.
//!
//! Each call validates its arguments, copies the descriptor state out of
//! the current task's PCB, dispatches through the slot's operation table
//! with no lock held (terminal and RTC reads block), and writes the
//! position back afterwards.

use crate::error::KernelError;
use crate::fs;
use crate::fs::fd::{ops_for_dentry, FD_COUNT};
use crate::process::table;

/// `read(fd, buf, n)`: dispatch to the descriptor's read operation.
pub fn sys_read(fd: i32, buf: &mut [u8]) -> Result<usize, KernelError> {
    if !(0..FD_COUNT as i32).contains(&fd) {
        return Err(KernelError::BadDescriptor { fd });
    }
    let pid = table::current_pid();
    let mut file = table::with(|t| t.pcb(pid).fds.get(fd as usize))
        .ok_or(KernelError::BadDescriptor { fd })?;

    let read = (file.ops.read)(&mut file, buf)?;

    table::with(|t| t.pcb_mut(pid).fds.put(fd as usize, file));
    Ok(read)
}

/// `write(fd, buf, n)`: dispatch to the descriptor's write operation.
pub fn sys_write(fd: i32, buf: &[u8]) -> Result<usize, KernelError> {
    if !(0..FD_COUNT as i32).contains(&fd) {
        return Err(KernelError::BadDescriptor { fd });
    }
    let pid = table::current_pid();
    let mut file = table::with(|t| t.pcb(pid).fds.get(fd as usize))
        .ok_or(KernelError::BadDescriptor { fd })?;

    let written = (file.ops.write)(&mut file, buf)?;

    table::with(|t| t.pcb_mut(pid).fds.put(fd as usize, file));
    Ok(written)
}

/// `open(name)`: resolve the dentry, install the type-appropriate operation
/// table in the lowest free slot, return the descriptor.
pub fn sys_open(name: &[u8]) -> Result<usize, KernelError> {
    let rofs = fs::rofs()?;
    let dentry = rofs.dentry_by_name(name)?;
    let mut file = ops_for_dentry(&dentry).ok_or(KernelError::InvalidArgument {
        name: "file type",
    })?;

    (file.ops.open)(&mut file)?;

    let pid = table::current_pid();
    table::with(|t| t.pcb_mut(pid).fds.allocate(file))
}

/// `close(fd)`: release a user descriptor (never stdin/stdout).
pub fn sys_close(fd: i32) -> Result<usize, KernelError> {
    let pid = table::current_pid();
    let mut file = table::with(|t| t.pcb_mut(pid).fds.release(fd))?;
    (file.ops.close)(&mut file)?;
    Ok(0)
}

/// `getargs(buf, n)`: copy out the saved argument string, NUL-terminated.
/// Fails when the task has no arguments or they do not fit.
pub fn sys_getargs(buf: &mut [u8]) -> Result<usize, KernelError> {
    let pid = table::current_pid();
    table::with(|t| {
        let args = t.pcb(pid).args.as_bytes();
        if args.is_empty() {
            return Err(KernelError::InvalidArgument { name: "no args" });
        }
        if args.len() + 1 > buf.len() {
            return Err(KernelError::InvalidArgument { name: "args length" });
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()] = 0;
        Ok(())
    })?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_bounds_are_checked_first() {
        let mut buf = [0u8; 8];
        assert!(matches!(
            sys_read(-1, &mut buf),
            Err(KernelError::BadDescriptor { fd: -1 })
        ));
        assert!(sys_read(FD_COUNT as i32, &mut buf).is_err());
        assert!(sys_write(-3, &buf).is_err());
        assert!(sys_write(8, &buf).is_err());
    }

    #[test]
    fn close_rejects_std_and_unopened_slots() {
        assert!(sys_close(0).is_err());
        assert!(sys_close(1).is_err());
        // Slot 5 was never opened in the pristine table.
        assert!(sys_close(5).is_err());
    }

    #[test]
    fn getargs_copies_exactly_or_fails() {
        let mut buf = [0u8; 16];

        // The pristine PCB has an empty argument string.
        assert!(sys_getargs(&mut buf).is_err());

        let pid = table::current_pid();
        table::with(|t| t.pcb_mut(pid).args.set(b"frame0.txt"));

        // Ten bytes of arguments need eleven bytes of buffer.
        assert!(sys_getargs(&mut buf[..10]).is_err());
        assert_eq!(sys_getargs(&mut buf[..11]), Ok(0));
        assert_eq!(&buf[..11], b"frame0.txt\0");

        table::with(|t| t.pcb_mut(pid).args.clear());
    }
}
