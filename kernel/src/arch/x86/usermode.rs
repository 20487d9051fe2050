//! Privilege-switch primitives.
//!
//! Exactly two control-transfer idioms exist in the kernel and both live
//! here: the iretd descent into ring 3, and the stack-swap resume of an
//! earlier kernel frame. Everything else (execute, halt, the scheduler)
//! composes these.
//!
//! The resume side requires that every kernel function keeps a standard
//! EBP frame; the workspace builds with `-C force-frame-pointers=yes`.

use core::arch::asm;

use super::gdt::{USER_CS, USER_DS};

/// Transfer control to ring 3 at `entry` with user stack `user_esp`.
///
/// Builds the five-word iretd frame (SS, ESP, EFLAGS, CS, EIP) on the
/// current kernel stack. EFLAGS gets IF set so the task is preemptible the
/// moment it starts executing; segments are the flat user selectors.
///
/// # Safety
/// - `entry` must point at mapped, user-accessible code.
/// - `user_esp` must lie in the mapped user window.
/// - The TSS `esp0` must already name this task's kernel stack, or the next
///   interrupt from ring 3 lands on a stale stack.
pub unsafe fn iret_to_user(entry: u32, user_esp: u32) -> ! {
    // SAFETY: Caller upholds the mapping and TSS preconditions. The frame is
    // built on the current stack and consumed by iretd in one sequence; DS/ES
    // are switched to the user selector before the descent since iretd only
    // reloads CS/SS.
    unsafe {
        asm!(
            "mov ds, {uds:x}",
            "mov es, {uds:x}",
            "push {uds}",
            "push {uesp}",
            "pushfd",
            "pop {tmp}",
            "or {tmp}, 0x200",
            "push {tmp}",
            "push {ucs}",
            "push {entry}",
            "iretd",
            uds = in(reg) USER_DS as u32,
            uesp = in(reg) user_esp,
            tmp = out(reg) _,
            ucs = in(reg) USER_CS as u32,
            entry = in(reg) entry,
            options(noreturn)
        );
    }
}

/// Resume an earlier kernel frame captured by [`current_frame`], delivering
/// `value` in the architectural return register.
///
/// After the switch, `leave; ret` unwinds as if the function owning the
/// captured frame had returned normally, so control lands at that
/// function's caller with EAX = `value`.
///
/// # Safety
/// - `ebp`/`esp` must be a pair captured inside a live `extern "C"` frame on
///   a kernel stack that has not been unwound or overwritten.
/// - Any locks taken after the capture point must have been released.
pub unsafe fn resume_kernel_frame(ebp: u32, esp: u32, value: i32) -> ! {
    // SAFETY: Caller guarantees the frame is intact. Once ESP/EBP are
    // swapped no Rust code from this function runs again; leave/ret complete
    // the unwind into the captured frame's caller.
    unsafe {
        asm!(
            "mov esp, {esp}",
            "mov ebp, {ebp}",
            "leave",
            "ret",
            esp = in(reg) esp,
            ebp = in(reg) ebp,
            in("eax") value,
            options(noreturn)
        );
    }
}

/// Capture the caller's EBP/ESP pair for a later [`resume_kernel_frame`].
///
/// Must stay `inline(always)`: the captured registers have to belong to the
/// frame of the function that intends to be resumed.
#[inline(always)]
pub fn current_frame() -> (u32, u32) {
    let ebp: u32;
    let esp: u32;
    // SAFETY: Plain register reads, no memory or flag effects.
    unsafe {
        asm!(
            "mov {ebp}, ebp",
            "mov {esp}, esp",
            ebp = out(reg) ebp,
            esp = out(reg) esp,
            options(nomem, nostack, preserves_flags)
        );
    }
    (ebp, esp)
}
