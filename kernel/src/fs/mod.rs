//! Filesystem layer: the read-only image driver and the descriptor tables.

pub mod fd;
pub mod rofs;

use spin::Once;

use crate::error::KernelError;
pub use rofs::{Dentry, FileType, Rofs};

static ROFS: Once<Rofs> = Once::new();

/// Mount the boot-time filesystem image. Later calls are ignored.
pub fn init(image: &'static [u8]) -> Result<(), KernelError> {
    let fs = Rofs::new(image)?;
    log::info!(
        "rofs: {} dentries, {} inodes, {} data blocks",
        fs.dentry_count(),
        fs.inode_count(),
        fs.data_block_count()
    );
    ROFS.call_once(|| fs);
    Ok(())
}

/// The mounted filesystem.
pub fn rofs() -> Result<&'static Rofs, KernelError> {
    ROFS.get().ok_or(KernelError::NotInitialized {
        subsystem: "filesystem",
    })
}

/// Test hook: mount a synthetic image if none is mounted yet.
#[cfg(test)]
pub(crate) fn init_for_tests(image: &'static [u8]) -> &'static Rofs {
    ROFS.call_once(|| Rofs::new(image).expect("valid test image"))
}
