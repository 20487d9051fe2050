//! Interrupt descriptor table.
//!
//! 256 gates: the 20 architectural exceptions map to named stubs that print
//! the exception and force-halt the offending task, the three device lines
//! (timer, keyboard, RTC) get hardware stubs, and 0x80 is the system-call
//! trap gate callable from ring 3.
//!
//! Every hardware IRQ stub is generated from the same macro and therefore
//! has an identical frame layout (iretd frame, pushad, call). The scheduler
//! saves EBP/ESP inside one stub's handler and may resume the task through a
//! different stub's epilogue; that only works while the layouts agree.

use core::arch::asm;

use spin::Mutex;

use super::gdt::KERNEL_CS;
use crate::process;

/// Scheduler timer vector (IRQ 0).
pub const PIT_VECTOR: u8 = 0x20;
/// Keyboard vector (IRQ 1).
pub const KEYBOARD_VECTOR: u8 = 0x21;
/// Real-time clock vector (IRQ 8).
pub const RTC_VECTOR: u8 = 0x28;
/// System-call vector.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Interrupt gate, present, DPL 0. Clears IF on entry.
const GATE_INTERRUPT: u8 = 0x8E;
/// Interrupt gate, present, DPL 3, callable from ring 3. IF clears on
/// entry, so system calls run unpreempted; the busy-wait reads re-enable
/// interrupts themselves between polls.
const GATE_SYSCALL: u8 = 0xEE;

/// One 8-byte IDT gate.
#[derive(Clone, Copy)]
#[repr(C)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, type_attr: u8) -> Self {
        IdtEntry {
            offset_low: (handler & 0xFFFF) as u16,
            selector: KERNEL_CS,
            zero: 0,
            type_attr,
            offset_high: (handler >> 16) as u16,
        }
    }
}

static IDT: Mutex<[IdtEntry; 256]> = Mutex::new([IdtEntry::missing(); 256]);

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

/// Intel names for vectors 0x00..0x13, printed by the exception policy.
const EXCEPTION_NAMES: [&str; 20] = [
    "Divide Error Exception",
    "Debug Exception",
    "NMI Interrupt",
    "Breakpoint Exception",
    "Overflow Exception",
    "BOUND Range Exceeded Exception",
    "Invalid Opcode Exception",
    "Device Not Available Exception",
    "Double Fault Exception",
    "Coprocessor Segment Overrun",
    "Invalid TSS Exception",
    "Segment Not Present",
    "Stack Fault Exception",
    "General Protection Exception",
    "Page-Fault Exception",
    "Reserved Exception",
    "x87 FPU Floating-Point Error",
    "Alignment Check Exception",
    "Machine-Check Exception",
    "SIMD Floating-Point Exception",
];

/// Common exception policy: print the name, then force the current task to
/// halt with the synthesized exception status. Never recovers in place.
extern "C" fn exception_entry(vector: u32) -> ! {
    let name = EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown Exception");
    crate::println!("{}.", name);
    loop {
        process::lifecycle::do_halt(process::EXCEPTION_RAW_STATUS);
    }
}

macro_rules! exception_stub {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            // The handler never returns, so any CPU-pushed error code can
            // stay on the stack.
            core::arch::naked_asm!(
                "push {vector}",
                "call {entry}",
                vector = const $vector,
                entry = sym exception_entry,
            )
        }
    };
}

exception_stub!(exception_0, 0);
exception_stub!(exception_1, 1);
exception_stub!(exception_2, 2);
exception_stub!(exception_3, 3);
exception_stub!(exception_4, 4);
exception_stub!(exception_5, 5);
exception_stub!(exception_6, 6);
exception_stub!(exception_7, 7);
exception_stub!(exception_8, 8);
exception_stub!(exception_9, 9);
exception_stub!(exception_10, 10);
exception_stub!(exception_11, 11);
exception_stub!(exception_12, 12);
exception_stub!(exception_13, 13);
exception_stub!(exception_14, 14);
exception_stub!(exception_15, 15);
exception_stub!(exception_16, 16);
exception_stub!(exception_17, 17);
exception_stub!(exception_18, 18);
exception_stub!(exception_19, 19);

/// Hardware interrupt stub. All instances must keep byte-identical frame
/// layout; see the module doc.
macro_rules! irq_stub {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            core::arch::naked_asm!(
                "pushad",
                "cld",
                "call {handler}",
                "popad",
                "iretd",
                handler = sym $handler,
            )
        }
    };
}

irq_stub!(pit_stub, crate::sched::timer_tick);
irq_stub!(keyboard_stub, crate::drivers::keyboard::irq_entry);
irq_stub!(rtc_stub, crate::drivers::rtc::irq_entry);

/// System-call entry: EAX = call number, EBX/ECX/EDX = arguments, result
/// back in EAX. All other registers are preserved around the dispatch.
#[unsafe(naked)]
extern "C" fn syscall_stub() {
    core::arch::naked_asm!(
        "push ebp",
        "push edi",
        "push esi",
        "push edx",
        "push ecx",
        "push ebx",
        "cld",
        // cdecl arguments, right to left: (num, arg0, arg1, arg2)
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        "call {dispatch}",
        "add esp, 16",
        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "iretd",
        dispatch = sym crate::syscall::dispatch,
    )
}

/// Build the table and load IDTR.
pub fn init() {
    let exceptions: [extern "C" fn(); 20] = [
        exception_0,
        exception_1,
        exception_2,
        exception_3,
        exception_4,
        exception_5,
        exception_6,
        exception_7,
        exception_8,
        exception_9,
        exception_10,
        exception_11,
        exception_12,
        exception_13,
        exception_14,
        exception_15,
        exception_16,
        exception_17,
        exception_18,
        exception_19,
    ];

    let mut idt = IDT.lock();
    for (vector, stub) in exceptions.iter().enumerate() {
        idt[vector] = IdtEntry::new(*stub as usize as u32, GATE_INTERRUPT);
    }
    idt[PIT_VECTOR as usize] = IdtEntry::new(pit_stub as usize as u32, GATE_INTERRUPT);
    idt[KEYBOARD_VECTOR as usize] = IdtEntry::new(keyboard_stub as usize as u32, GATE_INTERRUPT);
    idt[RTC_VECTOR as usize] = IdtEntry::new(rtc_stub as usize as u32, GATE_INTERRUPT);
    idt[SYSCALL_VECTOR as usize] = IdtEntry::new(syscall_stub as usize as u32, GATE_SYSCALL);

    let pointer = IdtPointer {
        limit: (core::mem::size_of::<[IdtEntry; 256]>() - 1) as u16,
        base: idt.as_ptr() as u32,
    };
    // SAFETY: The pointer names the fully populated static table; the table
    // is never moved or freed.
    unsafe {
        asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
    }
}
