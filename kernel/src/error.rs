//! Kernel-wide error types.
//!
//! Fallible internal APIs return `Result<_, KernelError>`. The raw `-1`
//! of the system-call ABI exists only at the dispatch boundary, where a
//! single translation point maps any `Err` to it.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// A caller-supplied argument failed validation
    InvalidArgument { name: &'static str },
    /// Pointer or range outside the user window
    BadUserPointer { addr: usize },
    /// File-descriptor number out of range or not open
    BadDescriptor { fd: i32 },
    /// A fixed-size table has no free slot
    ResourceExhausted { resource: &'static str },
    /// The named file is not a loadable executable
    NotExecutable,
    /// Write attempted through a read-only surface
    ReadOnly,
    /// Subsystem used before its `init()`
    NotInitialized { subsystem: &'static str },
    /// Entry point exists but has no implementation (signal calls)
    NotImplemented { feature: &'static str },
    /// Filesystem-level failure
    Fs(FsError),
}

/// Filesystem-specific errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No directory entry with the requested name
    NotFound,
    /// Directory-entry index past the fixed table
    IndexOutOfRange { index: u32 },
    /// Inode number not below the inode count
    BadInode { inode: u32 },
    /// A referenced data-block index is not below the block count
    BadBlock { block: u32 },
    /// Read range extends past the file length
    OutOfBounds,
    /// Image too small for the structures its boot block declares
    TruncatedImage,
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        KernelError::Fs(err)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidArgument { name } => write!(f, "invalid argument: {}", name),
            KernelError::BadUserPointer { addr } => {
                write!(f, "pointer {:#x} outside user window", addr)
            }
            KernelError::BadDescriptor { fd } => write!(f, "bad file descriptor {}", fd),
            KernelError::ResourceExhausted { resource } => write!(f, "no free {}", resource),
            KernelError::NotExecutable => write!(f, "not an executable"),
            KernelError::ReadOnly => write!(f, "read-only filesystem"),
            KernelError::NotInitialized { subsystem } => {
                write!(f, "{} used before init", subsystem)
            }
            KernelError::NotImplemented { feature } => write!(f, "{} not implemented", feature),
            KernelError::Fs(err) => write!(f, "filesystem: {:?}", err),
        }
    }
}
