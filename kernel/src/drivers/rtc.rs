//! CMOS real-time clock.
//!
//! The MC146818 periodic interrupt on IRQ 8 backs the RTC virtual file:
//! `read` blocks until the next tick, `write` reprograms the tick rate.
//! Tick arrival is published through one flag per terminal; the handler
//! sets all three, so a read may be satisfied by a tick that fired while
//! another terminal was executing (longstanding behaviour, kept).

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::KernelError;
use crate::fs::fd::{FileOps, OpenFile};
use crate::terminal::NUM_TERMINALS;

/// RTC line on the slave PIC.
pub const RTC_IRQ: u8 = 8;

/// Rate the clock falls back to on open and close.
pub const DEFAULT_FREQUENCY: u32 = 2;

/// Highest programmable tick frequency.
pub const MAX_FREQUENCY: u32 = 1024;

#[cfg(all(target_arch = "x86", target_os = "none"))]
const INDEX_PORT: u16 = 0x70;
#[cfg(all(target_arch = "x86", target_os = "none"))]
const DATA_PORT: u16 = 0x71;

/// Per-terminal tick flags. Set by the IRQ for every terminal.
static TICKED: [AtomicBool; NUM_TERMINALS] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

/// Currently programmed rate divider, kept for diagnostics.
static CURRENT_RATE: AtomicU8 = AtomicU8::new(0);

/// RTC virtual-file operation table.
pub static RTC_FILE_OPS: FileOps = FileOps {
    open: rtc_open,
    read: rtc_read,
    write: rtc_write,
    close: rtc_close,
};

/// Rate divider for a frequency: `frequency = 32768 >> (rate - 1)`.
///
/// Only powers of two in 2..=1024 Hz are programmable; higher rates would
/// disturb the chip's timekeeping and are rejected.
pub fn rate_for_frequency(frequency: u32) -> Option<u8> {
    if !(2..=MAX_FREQUENCY).contains(&frequency) || !frequency.is_power_of_two() {
        return None;
    }
    Some(16 - frequency.trailing_zeros() as u8)
}

fn set_frequency(frequency: u32) -> Result<(), KernelError> {
    let rate = rate_for_frequency(frequency).ok_or(KernelError::InvalidArgument {
        name: "rtc frequency",
    })?;
    CURRENT_RATE.store(rate, Ordering::Relaxed);

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::without_interrupts(|| {
        use crate::arch::x86::{inb, outb};
        // SAFETY: Standard CMOS register A access with NMI disabled (0x80):
        // select the register, read the old value, rewrite it with the rate
        // in the low nibble.
        unsafe {
            outb(INDEX_PORT, 0x8A);
            let prev = inb(DATA_PORT);
            outb(INDEX_PORT, 0x8A);
            outb(DATA_PORT, (prev & 0xF0) | (rate & 0x0F));
        }
    });

    Ok(())
}

/// Turn on periodic interrupts at the default rate and unmask IRQ 8.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    use crate::arch::x86::{inb, outb, pic};

    crate::arch::without_interrupts(|| {
        // SAFETY: Register B access with NMI disabled; setting bit 6 enables
        // the periodic interrupt. The read resets the index, so it is
        // reselected before the write.
        unsafe {
            outb(INDEX_PORT, 0x8B);
            let prev = inb(DATA_PORT);
            outb(INDEX_PORT, 0x8B);
            outb(DATA_PORT, prev | 0x40);
        }
    });

    let _ = set_frequency(DEFAULT_FREQUENCY);
    pic::enable_irq(RTC_IRQ);
}

/// IRQ 8 entry, called from the common interrupt stub.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub extern "C" fn irq_entry() {
    use crate::arch::x86::{inb, outb, pic};

    // SAFETY: Register C must be read after every periodic interrupt or the
    // chip never raises the line again; the contents are discarded.
    unsafe {
        outb(INDEX_PORT, 0x0C);
        let _ = inb(DATA_PORT);
    }
    pic::send_eoi(RTC_IRQ);

    for flag in &TICKED {
        flag.store(true, Ordering::Release);
    }
}

/// Test hook: pretend a periodic interrupt fired.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn simulate_tick() {
    for flag in &TICKED {
        flag.store(true, Ordering::Release);
    }
}

/// Busy-wait for the next tick visible to `terminal`, consuming its flag.
///
/// System calls arrive with interrupts off; the wait enables them so the
/// tick (and the scheduler) can actually happen.
fn wait_tick(terminal: usize) {
    let flag = &TICKED[terminal];
    crate::arch::enable_interrupts();
    while !flag.swap(false, Ordering::AcqRel) {
        core::hint::spin_loop();
    }
}

fn rtc_open(_file: &mut OpenFile) -> Result<(), KernelError> {
    set_frequency(DEFAULT_FREQUENCY)
}

/// Block until one tick at the current rate, then report zero bytes.
fn rtc_read(_file: &mut OpenFile, _buf: &mut [u8]) -> Result<usize, KernelError> {
    wait_tick(crate::sched::executing_terminal());
    Ok(0)
}

/// Accept exactly one 32-bit little-endian frequency.
fn rtc_write(_file: &mut OpenFile, buf: &[u8]) -> Result<usize, KernelError> {
    let bytes: [u8; 4] = buf.try_into().map_err(|_| KernelError::InvalidArgument {
        name: "rtc write length",
    })?;
    set_frequency(u32::from_le_bytes(bytes))?;
    Ok(4)
}

fn rtc_close(_file: &mut OpenFile) -> Result<(), KernelError> {
    set_frequency(DEFAULT_FREQUENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_table_matches_hardware_formula() {
        assert_eq!(rate_for_frequency(2), Some(15));
        assert_eq!(rate_for_frequency(4), Some(14));
        assert_eq!(rate_for_frequency(512), Some(7));
        assert_eq!(rate_for_frequency(1024), Some(6));
        for (frequency, rate) in [(2u32, 15u8), (8, 13), (64, 10), (1024, 6)] {
            assert_eq!(32768u32 >> (rate - 1), frequency);
            assert_eq!(rate_for_frequency(frequency), Some(rate));
        }
    }

    #[test]
    fn invalid_frequencies_are_rejected() {
        assert_eq!(rate_for_frequency(0), None);
        assert_eq!(rate_for_frequency(1), None);
        assert_eq!(rate_for_frequency(3), None);
        assert_eq!(rate_for_frequency(2048), None);
        assert_eq!(rate_for_frequency(100), None);
    }

    #[test]
    fn write_requires_four_bytes() {
        let mut file = OpenFile::for_ops(&RTC_FILE_OPS);
        assert!(rtc_write(&mut file, &8u32.to_le_bytes()).is_ok());
        assert!(rtc_write(&mut file, &[1, 2]).is_err());
        assert!(rtc_write(&mut file, &3u32.to_le_bytes()).is_err());
    }

    #[test]
    fn read_consumes_a_pending_tick() {
        simulate_tick();
        let mut file = OpenFile::for_ops(&RTC_FILE_OPS);
        let mut buf = [0u8; 1];
        // A tick is pending for every terminal, so this returns without
        // blocking.
        assert_eq!(rtc_read(&mut file, &mut buf), Ok(0));
    }
}
