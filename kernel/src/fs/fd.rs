//! File descriptors and per-kind operation tables.
//!
//! Every task owns a fixed 8-slot descriptor table inside its PCB. Slot 0
//! is stdin (terminal input), slot 1 is stdout (terminal output), slots
//! 2..7 are assigned by `open`. A slot records which operation table the
//! descriptor dispatches through, the inode (regular files only) and the
//! read position.

use crate::error::KernelError;
use crate::fs::rofs::Dentry;
use crate::terminal;

/// Descriptor-table capacity.
pub const FD_COUNT: usize = 8;
/// The stdin descriptor.
pub const STDIN: usize = 0;
/// The stdout descriptor.
pub const STDOUT: usize = 1;

/// Operation table for one kind of open file.
///
/// Plain function pointers rather than trait objects: the set of kinds is
/// closed and the table lives in a PCB that is copied around freely.
pub struct FileOps {
    pub open: fn(&mut OpenFile) -> Result<(), KernelError>,
    pub read: fn(&mut OpenFile, &mut [u8]) -> Result<usize, KernelError>,
    pub write: fn(&mut OpenFile, &[u8]) -> Result<usize, KernelError>,
    pub close: fn(&mut OpenFile) -> Result<(), KernelError>,
}

/// State of one occupied descriptor slot.
#[derive(Clone, Copy)]
pub struct OpenFile {
    pub ops: &'static FileOps,
    /// Inode index; 0 for anything that is not a regular file.
    pub inode: u32,
    /// Byte position for files, entry cursor for the directory.
    pub position: u32,
}

impl OpenFile {
    pub fn for_ops(ops: &'static FileOps) -> Self {
        OpenFile {
            ops,
            inode: 0,
            position: 0,
        }
    }

    pub fn for_inode(ops: &'static FileOps, inode: u32) -> Self {
        OpenFile {
            ops,
            inode,
            position: 0,
        }
    }
}

/// Fixed descriptor table; `None` marks a free slot.
#[derive(Clone, Copy)]
pub struct FdTable {
    slots: [Option<OpenFile>; FD_COUNT],
}

impl FdTable {
    /// Empty table, all slots free.
    pub const fn new() -> Self {
        FdTable {
            slots: [None; FD_COUNT],
        }
    }

    /// Table with stdin/stdout installed, the launch state of every task.
    pub fn with_std_streams() -> Self {
        let mut table = FdTable::new();
        table.slots[STDIN] = Some(OpenFile::for_ops(&STDIN_OPS));
        table.slots[STDOUT] = Some(OpenFile::for_ops(&STDOUT_OPS));
        table
    }

    pub fn get(&self, fd: usize) -> Option<OpenFile> {
        self.slots.get(fd).copied().flatten()
    }

    /// Write back a dispatched copy (position updates).
    pub fn put(&mut self, fd: usize, file: OpenFile) {
        if let Some(slot) = self.slots.get_mut(fd) {
            if slot.is_some() {
                *slot = Some(file);
            }
        }
    }

    /// Install `file` in the lowest free slot >= 2.
    pub fn allocate(&mut self, file: OpenFile) -> Result<usize, KernelError> {
        for fd in 2..FD_COUNT {
            if self.slots[fd].is_none() {
                self.slots[fd] = Some(file);
                return Ok(fd);
            }
        }
        Err(KernelError::ResourceExhausted {
            resource: "file descriptors",
        })
    }

    /// Free a user descriptor. Stdin/stdout cannot be closed.
    pub fn release(&mut self, fd: i32) -> Result<OpenFile, KernelError> {
        if !(2..FD_COUNT as i32).contains(&fd) {
            return Err(KernelError::BadDescriptor { fd });
        }
        self.slots[fd as usize]
            .take()
            .ok_or(KernelError::BadDescriptor { fd })
    }

    /// Drop every descriptor, running no close hooks.
    pub fn release_all(&mut self) {
        self.slots = [None; FD_COUNT];
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Operation tables
// ---------------------------------------------------------------------------

/// Regular files: positioned reads out of the image, writes rejected.
pub static REGULAR_FILE_OPS: FileOps = FileOps {
    open: noop_open,
    read: file_read,
    write: deny_write,
    close: noop_close,
};

/// The directory: successive entry names, writes rejected.
pub static DIRECTORY_OPS: FileOps = FileOps {
    open: noop_open,
    read: dir_read,
    write: deny_write,
    close: noop_close,
};

/// Stdin: line-buffered terminal input, write is an error.
pub static STDIN_OPS: FileOps = FileOps {
    open: deny_open,
    read: stdin_read,
    write: deny_write,
    close: deny_close,
};

/// Stdout: terminal output, read is an error.
pub static STDOUT_OPS: FileOps = FileOps {
    open: deny_open,
    read: deny_read,
    write: stdout_write,
    close: deny_close,
};

/// The operation table and inode for a freshly resolved dentry, or `None`
/// for unknown file types.
pub fn ops_for_dentry(dentry: &Dentry) -> Option<OpenFile> {
    use crate::fs::rofs::FileType;

    match FileType::from_raw(dentry.file_type)? {
        FileType::Rtc => Some(OpenFile::for_ops(&crate::drivers::rtc::RTC_FILE_OPS)),
        FileType::Directory => Some(OpenFile::for_ops(&DIRECTORY_OPS)),
        FileType::Regular => Some(OpenFile::for_inode(&REGULAR_FILE_OPS, dentry.inode)),
    }
}

fn noop_open(_file: &mut OpenFile) -> Result<(), KernelError> {
    Ok(())
}

fn noop_close(_file: &mut OpenFile) -> Result<(), KernelError> {
    Ok(())
}

fn deny_open(_file: &mut OpenFile) -> Result<(), KernelError> {
    Err(KernelError::InvalidArgument { name: "open" })
}

fn deny_close(_file: &mut OpenFile) -> Result<(), KernelError> {
    Err(KernelError::InvalidArgument { name: "close" })
}

fn deny_read(_file: &mut OpenFile, _buf: &mut [u8]) -> Result<usize, KernelError> {
    Err(KernelError::InvalidArgument { name: "read" })
}

fn deny_write(_file: &mut OpenFile, _buf: &[u8]) -> Result<usize, KernelError> {
    Err(KernelError::ReadOnly)
}

/// Read from the current position, clamped to the file length.
fn file_read(file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, KernelError> {
    let fs = crate::fs::rofs()?;
    let length = fs.inode_len(file.inode)?;
    let remaining = (length - file.position) as usize;
    let wanted = buf.len().min(remaining);
    let read = fs.read_data(file.inode, file.position, &mut buf[..wanted])?;
    file.position += read as u32;
    Ok(read)
}

/// One entry name per call; 0 at end of directory.
fn dir_read(file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, KernelError> {
    let fs = crate::fs::rofs()?;
    let mut position = file.position;
    let copied = fs.read_dir(&mut position, buf);
    file.position = position;
    Ok(copied)
}

/// Block for the next completed line on the calling task's terminal.
fn stdin_read(_file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, KernelError> {
    Ok(terminal::terminal_read(
        crate::sched::executing_terminal(),
        buf,
    ))
}

/// Copy to the calling task's terminal (screen or mirror).
fn stdout_write(_file: &mut OpenFile, buf: &[u8]) -> Result<usize, KernelError> {
    Ok(terminal::terminal_write(
        crate::sched::executing_terminal(),
        buf,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_streams_occupy_fixed_slots() {
        let table = FdTable::with_std_streams();
        assert!(table.get(STDIN).is_some());
        assert!(table.get(STDOUT).is_some());
        assert_eq!(table.open_count(), 2);
    }

    #[test]
    fn allocate_prefers_lowest_free_slot() {
        let mut table = FdTable::with_std_streams();
        let a = table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)).unwrap();
        let b = table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)).unwrap();
        assert_eq!((a, b), (2, 3));

        table.release(2).unwrap();
        let c = table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)).unwrap();
        assert_eq!(c, 2);
    }

    #[test]
    fn allocate_fails_when_full() {
        let mut table = FdTable::with_std_streams();
        for _ in 2..FD_COUNT {
            table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)).unwrap();
        }
        assert!(matches!(
            table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)),
            Err(KernelError::ResourceExhausted { .. })
        ));
    }

    #[test]
    fn close_semantics_match_the_syscall_contract() {
        let mut table = FdTable::with_std_streams();
        let fd = table.allocate(OpenFile::for_ops(&DIRECTORY_OPS)).unwrap() as i32;
        assert!(table.release(fd).is_ok());
        // Second close of the same descriptor fails.
        assert!(table.release(fd).is_err());
        // Stdin/stdout and out-of-range descriptors always fail.
        assert!(table.release(0).is_err());
        assert!(table.release(1).is_err());
        assert!(table.release(-1).is_err());
        assert!(table.release(FD_COUNT as i32).is_err());
    }

    #[test]
    fn write_on_readonly_kinds_fails() {
        let mut file = OpenFile::for_ops(&REGULAR_FILE_OPS);
        assert_eq!((file.ops.write)(&mut file, b"data"), Err(KernelError::ReadOnly));
        let mut dir = OpenFile::for_ops(&DIRECTORY_OPS);
        assert_eq!((dir.ops.write)(&mut dir, b"data"), Err(KernelError::ReadOnly));
        // And the std streams reject their off directions.
        let mut stdin = OpenFile::for_ops(&STDIN_OPS);
        assert!((stdin.ops.write)(&mut stdin, b"x").is_err());
        let mut stdout = OpenFile::for_ops(&STDOUT_OPS);
        assert!((stdout.ops.read)(&mut stdout, &mut [0u8; 1]).is_err());
    }
}
