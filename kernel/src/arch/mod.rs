//! Architecture support.
//!
//! All hardware access lives under `x86` and only builds for the 32-bit
//! bare-metal target. Hosted builds (unit tests) get the no-op fallbacks
//! below so that portable kernel logic can run unchanged.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use x86::{disable_interrupts, enable_interrupts, halt_loop, without_interrupts};

/// Run `f` with interrupts disabled, restoring the previous state after.
///
/// Hosted fallback: there are no interrupts to mask.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn disable_interrupts() {}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn enable_interrupts() {}

/// Park the CPU forever.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn halt_loop() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
