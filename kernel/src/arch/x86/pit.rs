//! 8253/8254 programmable interval timer.
//!
//! Channel 0 drives the scheduler at 100 Hz (one quantum every 10 ms).

use super::{outb, pic};

const CHANNEL_0: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave).
const MODE_3: u8 = 0x36;

/// Input clock of the PIT in Hz.
const PIT_FREQUENCY: u32 = 1_193_182;

/// Scheduler tick rate.
pub const TICK_HZ: u32 = 100;

/// Timer line on the master PIC.
pub const TIMER_IRQ: u8 = 0;

/// Program channel 0 for periodic interrupts at [`TICK_HZ`] and unmask
/// the timer line.
pub fn init() {
    let divisor = (PIT_FREQUENCY / TICK_HZ) as u16;

    // SAFETY: Mode/command write followed by the 16-bit divisor, low byte
    // then high byte, per the 8254 programming sequence. Interrupts are not
    // yet enabled for this line, so the sequence cannot be torn.
    unsafe {
        outb(COMMAND, MODE_3);
        outb(CHANNEL_0, (divisor & 0xFF) as u8);
        outb(CHANNEL_0, (divisor >> 8) as u8);
    }

    pic::enable_irq(TIMER_IRQ);
}
