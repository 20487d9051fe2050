//! User-pointer validation.
//!
//! Every pointer a task hands the kernel must land inside the 4 MiB user
//! window; anything else (null included) is rejected before the kernel
//! dereferences it.

use crate::error::KernelError;
use crate::mm::paging::{USER_WINDOW_BASE, USER_WINDOW_END};

/// Check that `[addr, addr + len)` lies inside the user window.
pub fn check_range(addr: u32, len: u32) -> Result<(), KernelError> {
    let end = addr.checked_add(len).ok_or(KernelError::BadUserPointer {
        addr: addr as usize,
    })?;
    if addr < USER_WINDOW_BASE || end > USER_WINDOW_END {
        return Err(KernelError::BadUserPointer {
            addr: addr as usize,
        });
    }
    Ok(())
}

/// Check that a four-byte word at `addr` lies inside the user window.
pub fn check_word(addr: u32) -> Result<(), KernelError> {
    check_range(addr, 4)
}

/// Borrow `[ptr, ptr + len)` as a slice after validation.
///
/// # Safety
/// The range must be mapped for the current task; the returned slice
/// aliases user memory and must not outlive the current system call.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub unsafe fn slice_from_user(ptr: u32, len: u32) -> Result<&'static [u8], KernelError> {
    check_range(ptr, len)?;
    // SAFETY: Range-checked above; the user window is mapped whenever a
    // task is executing, and the caller bounds the slice's lifetime.
    Ok(unsafe { core::slice::from_raw_parts(ptr as *const u8, len as usize) })
}

/// Mutable variant of [`slice_from_user`].
///
/// # Safety
/// As for [`slice_from_user`]; additionally the range must not alias any
/// kernel-held reference.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub unsafe fn slice_from_user_mut(ptr: u32, len: u32) -> Result<&'static mut [u8], KernelError> {
    check_range(ptr, len)?;
    // SAFETY: As above; user buffers are never also borrowed by the kernel.
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, len as usize) })
}

/// Copy a NUL-terminated string of at most `MAX` bytes out of user memory.
///
/// # Safety
/// `ptr` must be validated against the user window (done here) and mapped.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub unsafe fn copy_cstr_from_user<const MAX: usize>(
    ptr: u32,
    out: &mut [u8; MAX],
) -> Result<usize, KernelError> {
    for (index, slot) in out.iter_mut().enumerate() {
        let addr = ptr
            .checked_add(index as u32)
            .ok_or(KernelError::BadUserPointer { addr: ptr as usize })?;
        check_range(addr, 1)?;
        // SAFETY: Each byte is individually range-checked before the read.
        let byte = unsafe { core::ptr::read(addr as *const u8) };
        if byte == 0 {
            return Ok(index);
        }
        *slot = byte;
    }
    // Unterminated within the cap.
    Err(KernelError::InvalidArgument { name: "string" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_must_sit_inside_the_window() {
        assert!(check_range(USER_WINDOW_BASE, 0).is_ok());
        assert!(check_range(USER_WINDOW_BASE, 4 << 20).is_ok());
        assert!(check_range(USER_WINDOW_BASE + 100, 128).is_ok());

        assert!(check_range(0, 4).is_err());
        assert!(check_range(USER_WINDOW_BASE - 1, 4).is_err());
        assert!(check_range(USER_WINDOW_END - 3, 4).is_err());
        assert!(check_range(USER_WINDOW_END, 0).is_ok());
        assert!(check_range(u32::MAX - 2, 8).is_err());
    }

    #[test]
    fn word_check_covers_the_last_slot() {
        assert!(check_word(USER_WINDOW_END - 4).is_ok());
        assert!(check_word(USER_WINDOW_END - 3).is_err());
        assert!(check_word(0).is_err());
    }
}
