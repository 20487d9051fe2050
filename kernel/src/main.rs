//! Bootable kernel binary.
//!
//! GRUB loads the kernel per the multiboot v1 header below, with the
//! filesystem image attached as module 0. `_start` parks the stack at the
//! top of the kernel region and hands off to `kernel_main`, which brings
//! the subsystems up in dependency order and drops to user mode on
//! terminal 0.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod boot {
    use trion_kernel::process::lifecycle;
    use trion_kernel::{arch, drivers, fs, klog, mm, println};

    /// Value GRUB leaves in EAX for a multiboot v1 boot.
    const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

    // Multiboot v1 header: magic, flags (page-aligned modules + memory
    // info), checksum. Must sit in the first 8 KiB of the image.
    core::arch::global_asm!(
        r#"
.section .multiboot, "a"
.align 4
    .long 0x1BADB002
    .long 0x00000003
    .long -(0x1BADB002 + 0x00000003)

.section .text
.global _start
_start:
    cli
    mov esp, 0x800000
    push ebx
    push eax
    call {main}
2:
    hlt
    jmp 2b
"#,
        main = sym kernel_main,
    );

    /// Fields of the multiboot v1 information structure the kernel reads.
    #[repr(C)]
    struct MultibootInfo {
        flags: u32,
        mem_lower: u32,
        mem_upper: u32,
        boot_device: u32,
        cmdline: u32,
        mods_count: u32,
        mods_addr: u32,
    }

    #[repr(C)]
    struct MultibootModule {
        mod_start: u32,
        mod_end: u32,
        string: u32,
        reserved: u32,
    }

    /// Locate module 0, the filesystem image.
    ///
    /// Must run before paging is enabled: the info structure lives in low
    /// memory that the page directory never maps.
    fn filesystem_module(info_addr: u32) -> Option<&'static [u8]> {
        // SAFETY: The bootloader hands a valid info structure; paging is
        // still off so physical addresses are directly dereferencable.
        unsafe {
            let info = &*(info_addr as *const MultibootInfo);
            if info.flags & (1 << 3) == 0 || info.mods_count == 0 {
                return None;
            }
            let module = &*(info.mods_addr as *const MultibootModule);
            let len = (module.mod_end - module.mod_start) as usize;
            Some(core::slice::from_raw_parts(
                module.mod_start as *const u8,
                len,
            ))
        }
    }

    #[no_mangle]
    extern "C" fn kernel_main(magic: u32, info_addr: u32) -> ! {
        klog::init();
        log::info!("trion-kernel {}", env!("CARGO_PKG_VERSION"));

        if magic != MULTIBOOT_BOOTLOADER_MAGIC {
            panic!("bad bootloader magic {:#x}", magic);
        }
        let image = match filesystem_module(info_addr) {
            Some(image) => image,
            None => panic!("bootloader supplied no filesystem module"),
        };

        arch::x86::gdt::init();
        arch::x86::idt::init();
        arch::x86::pic::init();
        log::info!("descriptors and interrupt controller ready");

        mm::paging::init();

        if let Err(err) = fs::init(image) {
            panic!("filesystem mount failed: {}", err);
        }

        drivers::keyboard::init();
        drivers::rtc::init();

        println!("TrionOS booting: three terminals, ALT+F1..F3 to switch");

        // Loads the shells, starts the scheduler clock, never returns.
        lifecycle::spawn_boot_shells()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
