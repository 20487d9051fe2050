//! 8259A programmable interrupt controller pair.
//!
//! Master on ports 0x20/0x21, slave on 0xA0/0xA1, slave cascaded through
//! master IR2. IRQs 0-15 are remapped to vectors 0x20-0x2F so they stay
//! clear of the architectural exceptions.

use spin::Mutex;

use super::outb;

const MASTER_CMD: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_CMD: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

/// ICW1: edge-triggered, cascade mode, ICW4 needed.
const ICW1: u8 = 0x11;
/// ICW2: master IR0-7 mapped to vectors 0x20-0x27.
const ICW2_MASTER: u8 = 0x20;
/// ICW2: slave IR0-7 mapped to vectors 0x28-0x2F.
const ICW2_SLAVE: u8 = 0x28;
/// ICW3: master has a slave on IR2.
const ICW3_MASTER: u8 = 0x04;
/// ICW3: slave identity on the cascade line.
const ICW3_SLAVE: u8 = 0x02;
/// ICW4: 8086 mode, normal EOI.
const ICW4: u8 = 0x01;

/// Specific end-of-interrupt command base; OR in the IR number.
const EOI: u8 = 0x60;

/// Cached interrupt masks, bit set = line masked.
struct PicMasks {
    master: u8,
    slave: u8,
}

static MASKS: Mutex<PicMasks> = Mutex::new(PicMasks {
    master: 0xFF,
    slave: 0xFF,
});

/// Initialize both controllers with everything masked except the cascade.
pub fn init() {
    let mut masks = MASKS.lock();

    // SAFETY: Standard 8259 ICW1..ICW4 initialization sequence, written in
    // the order the controllers expect. All lines are masked first so no
    // spurious interrupt fires mid-sequence.
    unsafe {
        outb(MASTER_DATA, masks.master);
        outb(SLAVE_DATA, masks.slave);

        outb(MASTER_CMD, ICW1);
        outb(MASTER_DATA, ICW2_MASTER);
        outb(MASTER_DATA, ICW3_MASTER);
        outb(MASTER_DATA, ICW4);

        outb(SLAVE_CMD, ICW1);
        outb(SLAVE_DATA, ICW2_SLAVE);
        outb(SLAVE_DATA, ICW3_SLAVE);
        outb(SLAVE_DATA, ICW4);
    }
    drop(masks);

    // Cascade line must be open for any slave IRQ to arrive.
    enable_irq(2);
}

/// Unmask an IRQ line (0-15).
pub fn enable_irq(irq: u8) {
    let mut masks = MASKS.lock();
    if irq < 8 {
        masks.master &= !(1 << irq);
        // SAFETY: Mask register write on the master data port.
        unsafe { outb(MASTER_DATA, masks.master) };
    } else if irq < 16 {
        masks.slave &= !(1 << (irq - 8));
        // SAFETY: Mask register write on the slave data port.
        unsafe { outb(SLAVE_DATA, masks.slave) };
    }
}

/// Mask an IRQ line (0-15).
pub fn disable_irq(irq: u8) {
    let mut masks = MASKS.lock();
    if irq < 8 {
        masks.master |= 1 << irq;
        // SAFETY: Mask register write on the master data port.
        unsafe { outb(MASTER_DATA, masks.master) };
    } else if irq < 16 {
        masks.slave |= 1 << (irq - 8);
        // SAFETY: Mask register write on the slave data port.
        unsafe { outb(SLAVE_DATA, masks.slave) };
    }
}

/// Send a specific EOI for the IRQ; slave interrupts also release the
/// cascade line on the master.
pub fn send_eoi(irq: u8) {
    if irq >= 8 {
        // SAFETY: Specific-EOI command writes to both command ports.
        unsafe {
            outb(SLAVE_CMD, EOI | (irq - 8));
            outb(MASTER_CMD, EOI | 2);
        }
    } else {
        // SAFETY: Specific-EOI command write to the master command port.
        unsafe { outb(MASTER_CMD, EOI | irq) };
    }
}
