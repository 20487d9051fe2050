//! System-call dispatch.
//!
//! Software interrupt 0x80 carries the call number in EAX and up to three
//! arguments in EBX/ECX/EDX. The assembly stub (arch::x86::idt) forwards
//! them to [`dispatch`], which validates the number, marshals user
//! pointers into checked slices, and maps every internal error to the -1
//! of the ABI. Errors stop here; nothing below this boundary returns -1.

mod calls;

pub use calls::{sys_close, sys_getargs, sys_open, sys_read, sys_write};

use crate::error::KernelError;
use crate::process::lifecycle;

/// The nine system calls (plus the split signal pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    Vidmap = 8,
    SetHandler = 9,
    SigReturn = 10,
}

impl TryFrom<u32> for Syscall {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Syscall::Halt),
            2 => Ok(Syscall::Execute),
            3 => Ok(Syscall::Read),
            4 => Ok(Syscall::Write),
            5 => Ok(Syscall::Open),
            6 => Ok(Syscall::Close),
            7 => Ok(Syscall::GetArgs),
            8 => Ok(Syscall::Vidmap),
            9 => Ok(Syscall::SetHandler),
            10 => Ok(Syscall::SigReturn),
            _ => Err(()),
        }
    }
}

/// Fold a kernel result into the ABI: payload, or -1.
fn to_ret(result: Result<usize, KernelError>) -> i32 {
    match result {
        Ok(value) => value as i32,
        Err(_) => -1,
    }
}

/// Single entry point behind int 0x80.
#[no_mangle]
pub extern "C" fn dispatch(number: u32, arg0: u32, arg1: u32, arg2: u32) -> i32 {
    let Ok(call) = Syscall::try_from(number) else {
        return -1;
    };

    match call {
        Syscall::Halt => lifecycle::do_halt(arg0),
        Syscall::SetHandler | Syscall::SigReturn => to_ret(Err(KernelError::NotImplemented {
            feature: "signals",
        })),
        Syscall::Close => to_ret(sys_close(arg0 as i32)),

        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::Execute => dispatch_execute(arg0),
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::Read => dispatch_read(arg0, arg1, arg2),
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::Write => dispatch_write(arg0, arg1, arg2),
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::Open => dispatch_open(arg0),
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::GetArgs => dispatch_getargs(arg0, arg1),
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        Syscall::Vidmap => dispatch_vidmap(arg0),

        // Pointer-marshalling calls need a live user window.
        #[cfg(not(all(target_arch = "x86", target_os = "none")))]
        _ => -1,
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_execute(cmd_ptr: u32) -> i32 {
    use crate::process::pcb::MAX_ARG_LEN;

    let mut command = [0u8; MAX_ARG_LEN];
    // SAFETY: copy_cstr_from_user checks every byte against the window.
    let len = match unsafe { crate::mm::user::copy_cstr_from_user(cmd_ptr, &mut command) } {
        Ok(len) => len,
        Err(_) => return -1,
    };
    // The command buffer lives in this frame, which stays alive beneath the
    // child until halt resumes do_execute.
    lifecycle::do_execute(command.as_ptr(), len)
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_read(fd: u32, buf: u32, nbytes: u32) -> i32 {
    if (nbytes as i32) < 0 {
        return -1;
    }
    // SAFETY: Range-checked against the user window; the slice dies with
    // this call.
    let slice = match unsafe { crate::mm::user::slice_from_user_mut(buf, nbytes) } {
        Ok(slice) => slice,
        Err(_) => return -1,
    };
    to_ret(sys_read(fd as i32, slice))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_write(fd: u32, buf: u32, nbytes: u32) -> i32 {
    if (nbytes as i32) < 0 {
        return -1;
    }
    // SAFETY: As in dispatch_read.
    let slice = match unsafe { crate::mm::user::slice_from_user(buf, nbytes) } {
        Ok(slice) => slice,
        Err(_) => return -1,
    };
    to_ret(sys_write(fd as i32, slice))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_open(name_ptr: u32) -> i32 {
    let mut name = [0u8; 64];
    // SAFETY: Per-byte window check inside.
    let len = match unsafe { crate::mm::user::copy_cstr_from_user(name_ptr, &mut name) } {
        Ok(len) => len,
        Err(_) => return -1,
    };
    to_ret(sys_open(&name[..len]))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_getargs(buf: u32, nbytes: u32) -> i32 {
    // SAFETY: Range-checked against the user window.
    let slice = match unsafe { crate::mm::user::slice_from_user_mut(buf, nbytes) } {
        Ok(slice) => slice,
        Err(_) => return -1,
    };
    to_ret(sys_getargs(slice))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn dispatch_vidmap(screen_start: u32) -> i32 {
    if crate::mm::user::check_word(screen_start).is_err() {
        return -1;
    }
    // SAFETY: The word was just validated to lie inside the mapped user
    // window.
    unsafe {
        core::ptr::write(screen_start as *mut u32, crate::mm::VID_MAP_BASE);
    }
    crate::mm::flush_tlb();
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_numbers_fail() {
        assert_eq!(dispatch(0, 0, 0, 0), -1);
        assert_eq!(dispatch(11, 0, 0, 0), -1);
        assert_eq!(dispatch(u32::MAX, 0, 0, 0), -1);
    }

    #[test]
    fn signal_entry_points_are_stubbed() {
        assert_eq!(dispatch(9, 0, 0, 0), -1);
        assert_eq!(dispatch(10, 0, 0, 0), -1);
    }

    #[test]
    fn close_validates_before_touching_the_task() {
        assert_eq!(dispatch(6, u32::MAX, 0, 0), -1); // fd -1
        assert_eq!(dispatch(6, 0, 0, 0), -1); // stdin
        assert_eq!(dispatch(6, 99, 0, 0), -1); // out of range
    }
}
