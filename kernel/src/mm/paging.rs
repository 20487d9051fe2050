//! Two-level paging for the 32-bit address space.
//!
//! One page directory serves the whole system. The standing mappings:
//!
//! - entry 0: 4 KiB table holding only the VGA text page (identity).
//! - entry 1: the kernel's 4 MiB identity page at physical 4 MiB, global.
//! - entry 31: the vidmap table, whose single page aliases either the real
//!   VGA bank or a terminal's mirror.
//! - entry 32: the 4 MiB user window at virtual 128 MiB, re-pointed to the
//!   running task's physical frame on every context switch.
//!
//! Mutation is reserved to this module's operations, invoked by the
//! scheduler and the execute/halt paths with interrupts disabled.

use bitflags::bitflags;
use spin::Mutex;

bitflags! {
    /// Page directory / page table entry bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        /// 4 MiB page (directory entries only).
        const PAGE_SIZE = 1 << 7;
        const GLOBAL = 1 << 8;
    }
}

/// One page directory or page table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn absent() -> Self {
        Entry(0)
    }

    /// Directory entry for a 4 MiB page at `phys` (4 MiB aligned).
    pub fn big_page(phys: u32, flags: EntryFlags) -> Self {
        Entry((phys & 0xFFC0_0000) | (flags | EntryFlags::PAGE_SIZE).bits())
    }

    /// Directory entry pointing at a page table at `table` (4 KiB aligned).
    pub fn table(table: u32, flags: EntryFlags) -> Self {
        Entry((table & 0xFFFF_F000) | flags.bits())
    }

    /// Table entry for a 4 KiB page at `phys` (4 KiB aligned).
    pub fn page(phys: u32, flags: EntryFlags) -> Self {
        Entry((phys & 0xFFFF_F000) | flags.bits())
    }

    pub fn is_present(self) -> bool {
        self.0 & EntryFlags::PRESENT.bits() != 0
    }

    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    /// Physical frame of a 4 MiB directory entry.
    pub fn big_page_addr(self) -> u32 {
        self.0 & 0xFFC0_0000
    }

    /// Physical frame of a 4 KiB table entry.
    pub fn page_addr(self) -> u32 {
        self.0 & 0xFFFF_F000
    }
}

/// 1024 entries, 4 KiB aligned so the hardware can walk it.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [Entry; 1024],
}

impl PageTable {
    pub const fn empty() -> Self {
        PageTable {
            entries: [Entry::absent(); 1024],
        }
    }

    pub fn entry(&self, index: usize) -> Entry {
        self.entries[index]
    }

    pub fn set_entry(&mut self, index: usize, entry: Entry) {
        self.entries[index] = entry;
    }

    fn address(&self) -> u32 {
        self as *const PageTable as usize as u32
    }
}

/// Directory slot of the kernel's identity page.
pub const KERNEL_INDEX: usize = 1;
/// Directory slot of the vidmap table.
pub const VID_MAP_INDEX: usize = 31;
/// Directory slot of the user window.
pub const USER_WINDOW_INDEX: usize = 32;

/// Physical address of the kernel image.
pub const KERNEL_BASE: u32 = 0x40_0000;
/// Physical address of the VGA text page.
pub const VGA_PHYS: u32 = 0xB8000;
/// Page-table slot of the VGA page within the low 4 MiB.
const VGA_SLOT: usize = (VGA_PHYS >> 12) as usize;

/// Base virtual address of the user window (128 MiB).
pub const USER_WINDOW_BASE: u32 = (USER_WINDOW_INDEX as u32) << 22;
/// One-past-the-end virtual address of the user window.
pub const USER_WINDOW_END: u32 = ((USER_WINDOW_INDEX as u32) + 1) << 22;
/// Virtual address user programs are loaded at.
pub const PROGRAM_LOAD_ADDR: u32 = 0x0804_8000;
/// Initial user stack pointer: top word of the user window.
pub const USER_STACK_TOP: u32 = USER_WINDOW_END - 4;
/// Virtual address of the vidmap page handed to user tasks.
pub const VID_MAP_BASE: u32 = (VID_MAP_INDEX as u32) << 22;

/// Physical frame backing the user window of task `pid`.
pub const fn user_frame(pid: usize) -> u32 {
    ((pid as u32) + 2) << 22
}

static DIRECTORY: Mutex<PageTable> = Mutex::new(PageTable::empty());
static LOW_TABLE: Mutex<PageTable> = Mutex::new(PageTable::empty());
static VIDMAP_TABLE: Mutex<PageTable> = Mutex::new(PageTable::empty());

/// Build the boot mappings and switch the MMU on.
pub fn init() {
    let user_rw = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;

    {
        let mut low = LOW_TABLE.lock();
        low.set_entry(VGA_SLOT, Entry::page(VGA_PHYS, user_rw));

        let mut vidmap = VIDMAP_TABLE.lock();
        vidmap.set_entry(0, Entry::page(VGA_PHYS, user_rw));

        let mut directory = DIRECTORY.lock();
        directory.set_entry(0, Entry::table(low.address(), user_rw));
        directory.set_entry(
            KERNEL_INDEX,
            Entry::big_page(
                KERNEL_BASE,
                EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::GLOBAL,
            ),
        );
        directory.set_entry(VID_MAP_INDEX, Entry::table(vidmap.address(), user_rw));
    }

    enable();
    log::info!("paging: kernel + video mappings live");
}

/// Point the user window at task `pid`'s physical frame.
///
/// Caller must flush the TLB afterwards (interrupts disabled across both).
pub fn map_user_window(pid: usize) -> Result<(), crate::error::KernelError> {
    // Frames 0 and 1 hold the low mappings and the kernel.
    let frame_index = pid + 2;
    if !(2..1024).contains(&frame_index) {
        return Err(crate::error::KernelError::InvalidArgument { name: "pid" });
    }
    DIRECTORY.lock().set_entry(
        USER_WINDOW_INDEX,
        Entry::big_page(
            user_frame(pid),
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
        ),
    );
    Ok(())
}

/// Alias the vidmap page to `phys`: the real VGA bank when the executing
/// terminal is displayed, that terminal's mirror otherwise.
pub fn map_vidmap_to(phys: u32) {
    VIDMAP_TABLE.lock().set_entry(
        0,
        Entry::page(
            phys,
            EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER,
        ),
    );
}

/// Re-point the vidmap page for terminal `term` per the displayed split.
pub fn map_vidmap(term: usize) {
    let phys = if crate::terminal::displayed_id() == term {
        VGA_PHYS
    } else {
        crate::terminal::mirror_address(term) as u32
    };
    map_vidmap_to(phys);
}

/// Reload CR3, discarding non-global TLB entries.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn flush_tlb() {
    let directory = DIRECTORY.lock().address();
    // SAFETY: CR3 is reloaded with the same directory address; the only
    // effect is the TLB flush.
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) directory, options(nostack, preserves_flags));
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn flush_tlb() {}

/// Load CR3 and set the paging bits: CR4.PSE for 4 MiB pages, CR4.PGE for
/// global pages, CR0.PG to switch translation on.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn enable() {
    let directory = DIRECTORY.lock().address();
    // SAFETY: The directory maps the kernel's own 4 MiB identity page
    // before this runs, so the instruction stream stays mapped across the
    // CR0 write.
    unsafe {
        core::arch::asm!(
            "mov cr3, {dir}",
            "mov {tmp}, cr4",
            "or {tmp}, 0x90", // PSE | PGE
            "mov cr4, {tmp}",
            "mov {tmp}, cr0",
            "or {tmp}, 0x80000000", // PG
            "mov cr0, {tmp}",
            dir = in(reg) directory,
            tmp = out(reg) _,
            options(nostack)
        );
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn enable() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_builders_mask_addresses() {
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
        let big = Entry::big_page(0x0080_1234, flags);
        assert_eq!(big.big_page_addr(), 0x0080_0000);
        assert!(big.flags().contains(EntryFlags::PAGE_SIZE));

        let page = Entry::page(0x000B_8FFF, flags);
        assert_eq!(page.page_addr(), 0x000B_8000);
        assert!(!page.flags().contains(EntryFlags::PAGE_SIZE));
    }

    #[test]
    fn user_frames_start_at_8_mib() {
        assert_eq!(user_frame(0), 0x0080_0000);
        assert_eq!(user_frame(1), 0x00C0_0000);
        assert_eq!(user_frame(6), 0x0200_0000);
    }

    #[test]
    fn user_window_constants_line_up() {
        assert_eq!(USER_WINDOW_BASE, 0x0800_0000);
        assert_eq!(USER_WINDOW_END, 0x0840_0000);
        assert_eq!(USER_STACK_TOP, 0x083F_FFFC);
        assert!(PROGRAM_LOAD_ADDR > USER_WINDOW_BASE);
        assert!(PROGRAM_LOAD_ADDR < USER_WINDOW_END);
        assert_eq!(VID_MAP_BASE, 0x07C0_0000);
    }

    #[test]
    fn map_user_window_repoints_the_window_entry() {
        map_user_window(4).unwrap();
        let entry = DIRECTORY.lock().entry(USER_WINDOW_INDEX);
        assert_eq!(entry.big_page_addr(), user_frame(4));
        assert!(entry.flags().contains(EntryFlags::USER));
        assert!(entry.flags().contains(EntryFlags::PAGE_SIZE));

        map_user_window(0).unwrap();
        let entry = DIRECTORY.lock().entry(USER_WINDOW_INDEX);
        assert_eq!(entry.big_page_addr(), user_frame(0));

        assert!(map_user_window(1022).is_err());
    }

    #[test]
    fn vidmap_entry_follows_the_requested_frame() {
        map_vidmap_to(VGA_PHYS);
        assert_eq!(VIDMAP_TABLE.lock().entry(0).page_addr(), VGA_PHYS);

        map_vidmap_to(0x0030_0000);
        let entry = VIDMAP_TABLE.lock().entry(0);
        assert_eq!(entry.page_addr(), 0x0030_0000);
        assert!(entry.flags().contains(EntryFlags::USER));
    }
}
