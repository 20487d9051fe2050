//! GDT and TSS setup.
//!
//! Flat 4 GiB segments for both rings plus a single TSS whose `esp0` is
//! repointed at every context switch so ring-3 -> ring-0 transitions land on
//! the incoming task's kernel stack.

use core::arch::asm;
use core::ptr::addr_of;

/// Kernel code segment selector (GDT index 2, RPL 0).
pub const KERNEL_CS: u16 = 0x0010;
/// Kernel data segment selector (GDT index 3, RPL 0).
pub const KERNEL_DS: u16 = 0x0018;
/// User code segment selector (GDT index 4, RPL 3).
pub const USER_CS: u16 = 0x0023;
/// User data segment selector (GDT index 5, RPL 3).
pub const USER_DS: u16 = 0x002B;
/// TSS selector (GDT index 6).
pub const KERNEL_TSS: u16 = 0x0030;

/// 32-bit task-state segment. Only `esp0`/`ss0` are live; the CPU loads them
/// on every privilege transition. Hardware task switching is not used.
#[repr(C, packed)]
struct TaskStateSegment {
    prev_task_link: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt_selector: u32,
    iomap_base: u32,
}

const fn empty_tss() -> TaskStateSegment {
    TaskStateSegment {
        prev_task_link: 0,
        esp0: 0,
        ss0: 0,
        esp1: 0,
        ss1: 0,
        esp2: 0,
        ss2: 0,
        cr3: 0,
        eip: 0,
        eflags: 0,
        eax: 0,
        ecx: 0,
        edx: 0,
        ebx: 0,
        esp: 0,
        ebp: 0,
        esi: 0,
        edi: 0,
        es: 0,
        cs: 0,
        ss: 0,
        ds: 0,
        fs: 0,
        gs: 0,
        ldt_selector: 0,
        // No I/O permission bitmap: base past the segment limit.
        iomap_base: (core::mem::size_of::<TaskStateSegment>() as u32) << 16,
    }
}

static mut TSS: TaskStateSegment = empty_tss();

/// Build a segment descriptor from base, 20-bit limit, access byte and flags
/// nibble (granularity/size).
const fn descriptor(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    (limit as u64 & 0xFFFF)
        | ((base as u64 & 0xFF_FFFF) << 16)
        | ((access as u64) << 40)
        | (((limit as u64 >> 16) & 0xF) << 48)
        | ((flags as u64 & 0xF) << 52)
        | (((base as u64 >> 24) & 0xFF) << 56)
}

/// GDT layout: null, reserved, kernel code, kernel data, user code,
/// user data, TSS. The TSS entry is patched at init time once the TSS
/// address is known.
static mut GDT: [u64; 7] = [
    0,
    0,
    descriptor(0, 0xF_FFFF, 0x9A, 0xC), // kernel code, flat
    descriptor(0, 0xF_FFFF, 0x92, 0xC), // kernel data, flat
    descriptor(0, 0xF_FFFF, 0xFA, 0xC), // user code, flat
    descriptor(0, 0xF_FFFF, 0xF2, 0xC), // user data, flat
    0,                                  // TSS, patched in init()
];

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

/// Install the GDT, reload the segment registers, and load the TSS.
pub fn init() {
    let tss_limit = core::mem::size_of::<TaskStateSegment>() as u32 - 1;

    // SAFETY: Single-threaded boot context, before interrupts are enabled.
    // Patching the TSS slot and loading GDTR/TR with valid descriptors is
    // the defined setup sequence; the far-return reloads CS with a selector
    // that points at an identical flat code segment.
    unsafe {
        let tss_base = addr_of!(TSS) as u32;
        let gdt = core::ptr::addr_of_mut!(GDT);
        (*gdt)[6] = descriptor(tss_base, tss_limit, 0x89, 0x0);

        let pointer = DescriptorTablePointer {
            limit: core::mem::size_of::<[u64; 7]>() as u16 - 1,
            base: gdt as u32,
        };
        asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));

        // Reload data segments, then CS via far return.
        asm!(
            "mov ds, {sel:x}",
            "mov es, {sel:x}",
            "mov fs, {sel:x}",
            "mov gs, {sel:x}",
            "mov ss, {sel:x}",
            sel = in(reg) KERNEL_DS as u32,
            options(nostack, preserves_flags)
        );
        asm!(
            "push {cs}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            cs = in(reg) KERNEL_CS as u32,
            tmp = out(reg) _,
        );

        asm!("ltr {:x}", in(reg) KERNEL_TSS, options(nomem, nostack, preserves_flags));
    }
}

/// Point the TSS ring-0 stack at `esp0` (with `ss0` = kernel data).
///
/// Must be called with interrupts disabled; the CPU may read the TSS on any
/// interrupt taken from ring 3.
pub fn set_kernel_stack(esp0: u32) {
    // SAFETY: Raw field stores into the static TSS; no references are formed
    // and the caller holds interrupts off, so the CPU cannot observe a torn
    // esp0/ss0 pair.
    unsafe {
        let tss = core::ptr::addr_of_mut!(TSS);
        (*tss).esp0 = esp0;
        (*tss).ss0 = KERNEL_DS as u32;
    }
}
