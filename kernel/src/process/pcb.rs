//! Per-task control block.
//!
//! PCBs live in a fixed arena indexed by PID (see [`super::table`]); the
//! parent/child relationship is stored as optional indices into that arena,
//! never as pointers. Each PID additionally owns the 8 KiB kernel-stack
//! block at `8 MiB - (pid + 1) * 8 KiB`.

use crate::fs::fd::FdTable;

/// Capacity of the saved argument string, terminator included.
pub const MAX_ARG_LEN: usize = 128;

/// The argument tail of the command that started this task.
#[derive(Clone, Copy)]
pub struct ArgBuffer {
    buf: [u8; MAX_ARG_LEN],
    len: usize,
}

impl ArgBuffer {
    pub const fn new() -> Self {
        ArgBuffer {
            buf: [0; MAX_ARG_LEN],
            len: 0,
        }
    }

    /// Store `args`, truncated so a NUL terminator always fits.
    pub fn set(&mut self, args: &[u8]) {
        let len = args.len().min(MAX_ARG_LEN - 1);
        self.buf[..len].copy_from_slice(&args[..len]);
        self.len = len;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for ArgBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Process control block.
pub struct Pcb {
    /// This task's PID, equal to its arena slot.
    pub pid: usize,
    /// Open-file table; slots 0/1 are the terminal streams.
    pub fds: FdTable,
    /// Arena index of the parent task; `None` for the boot shells.
    pub parent: Option<usize>,
    /// Arena index of the child this task is blocked in `execute` on.
    pub child: Option<usize>,
    /// Caller frame inside `execute`, restored by the child's `halt`.
    pub parent_ebp: u32,
    pub parent_esp: u32,
    /// Frame the scheduler last suspended this task at.
    pub return_ebp: u32,
    pub return_esp: u32,
    /// User-mode entry point of the loaded program.
    pub entry: u32,
    /// Argument tail for `getargs`.
    pub args: ArgBuffer,
}

impl Pcb {
    pub const fn new(pid: usize) -> Self {
        Pcb {
            pid,
            fds: FdTable::new(),
            parent: None,
            child: None,
            parent_ebp: 0,
            parent_esp: 0,
            return_ebp: 0,
            return_esp: 0,
            entry: 0,
            args: ArgBuffer::new(),
        }
    }
}

/// Split a command line into the program name and the argument tail.
///
/// Leading spaces are skipped on both parts; returns `None` for a command
/// with no program name.
pub fn parse_command(command: &[u8]) -> Option<(&[u8], &[u8])> {
    let start = command.iter().position(|&b| b != b' ')?;
    let rest = &command[start..];
    let name_end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
    let name = &rest[..name_end];

    let tail = &rest[name_end..];
    let args_start = tail
        .iter()
        .position(|&b| b != b' ')
        .unwrap_or(tail.len());
    Some((name, &tail[args_start..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_name_and_args() {
        assert_eq!(parse_command(b"shell"), Some((&b"shell"[..], &b""[..])));
        assert_eq!(
            parse_command(b"cat frame0.txt"),
            Some((&b"cat"[..], &b"frame0.txt"[..]))
        );
        assert_eq!(
            parse_command(b"  grep   very long  tail"),
            Some((&b"grep"[..], &b"very long  tail"[..]))
        );
        assert_eq!(parse_command(b""), None);
        assert_eq!(parse_command(b"    "), None);
    }

    #[test]
    fn arg_buffer_truncates_for_the_terminator() {
        let mut args = ArgBuffer::new();
        args.set(&[b'a'; 200]);
        assert_eq!(args.len(), MAX_ARG_LEN - 1);

        args.set(b"frame0.txt");
        assert_eq!(args.as_bytes(), b"frame0.txt");
        args.clear();
        assert!(args.is_empty());
    }
}
