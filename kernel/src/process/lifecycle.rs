//! Task lifecycle: `execute`, `halt`, and the boot shells.
//!
//! `execute` and `halt` are two halves of one stack handshake. `execute`
//! saves its own EBP/ESP in the child's PCB and drops to user mode; the
//! child's eventual `halt` restores that frame and "returns" from
//! `do_execute` with the halt status in EAX. Both run on the raw i32 ABI
//! rather than `Result`, because the resumed frame delivers its value in
//! the architectural return register.

use crate::error::KernelError;
use crate::fs;
use crate::process::pcb::parse_command;
use crate::process::{loader, table};

#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::arch::x86::{gdt, usermode};
#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::fs::fd::FdTable;
#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::mm;
#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::process::pcb::Pcb;
#[cfg(all(target_arch = "x86", target_os = "none"))]
use crate::process::{EXCEPTION_RAW_STATUS, EXCEPTION_STATUS};

/// Program every terminal boots into.
pub const SHELL: &[u8] = b"shell";

/// A vetted `execute` request: the program exists and carries the magic.
#[derive(Debug)]
pub struct ExecPlan<'a> {
    pub inode: u32,
    pub args: &'a [u8],
}

/// Parse and vet a command line against the filesystem.
pub fn prepare(command: &[u8]) -> Result<ExecPlan<'_>, KernelError> {
    let (name, args) = parse_command(command).ok_or(KernelError::InvalidArgument {
        name: "command",
    })?;
    let fs = fs::rofs()?;
    let dentry = fs.dentry_by_name(name)?;

    let mut head = [0u8; 4];
    fs.read_data(dentry.inode, 0, &mut head)
        .map_err(|_| KernelError::NotExecutable)?;
    if !loader::is_executable(&head) {
        return Err(KernelError::NotExecutable);
    }
    Ok(ExecPlan {
        inode: dentry.inode,
        args,
    })
}

/// The `execute` system call.
///
/// Returns -1 for unknown or non-executable programs, 0 when the PID table
/// is exhausted (documented contract: a warning is printed and 0 returned),
/// and otherwise does not return until the child halts, at which point the
/// child's status appears as this function's return value.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[inline(never)]
pub extern "C" fn do_execute(cmd_ptr: *const u8, cmd_len: usize) -> i32 {
    // SAFETY: The dispatcher copied the command into kernel memory that
    // outlives this call.
    let command = unsafe { core::slice::from_raw_parts(cmd_ptr, cmd_len) };

    let (inode, args) = match prepare(command) {
        Ok(plan) => (plan.inode, plan.args),
        Err(_) => return -1,
    };

    let parent = table::current_pid();
    let pid = match table::with(|t| t.allocate_user_pid()) {
        Some(pid) => pid,
        None => {
            crate::println!("Process # limit reached");
            return 0;
        }
    };

    if mm::map_user_window(pid).is_err() {
        table::with(|t| t.set_live(pid, false));
        return -1;
    }
    mm::flush_tlb();

    let rofs = match fs::rofs() {
        Ok(rofs) => rofs,
        Err(_) => {
            table::with(|t| t.set_live(pid, false));
            return -1;
        }
    };
    let entry = match loader::load_program(rofs, inode) {
        Ok(entry) => entry,
        Err(_) => {
            // Partial copy: release the PID and re-point the window at the
            // parent before failing.
            table::with(|t| t.set_live(pid, false));
            let _ = mm::map_user_window(parent);
            mm::flush_tlb();
            return -1;
        }
    };

    table::with(|t| {
        let pcb = t.pcb_mut(pid);
        *pcb = Pcb::new(pid);
        pcb.fds = FdTable::with_std_streams();
        pcb.entry = entry;
        pcb.args.set(args);
        pcb.parent = Some(parent);
        t.pcb_mut(parent).child = Some(pid);
    });

    // Everything from the frame capture to the iretd must look atomic to
    // the scheduler.
    let (ebp, esp) = usermode::current_frame();
    crate::arch::disable_interrupts();
    table::with(|t| {
        let pcb = t.pcb_mut(pid);
        pcb.parent_ebp = ebp;
        pcb.parent_esp = esp;
    });
    gdt::set_kernel_stack(table::kernel_stack_top(pid));

    // SAFETY: The user window is mapped to the child's frame with the
    // program loaded, and the TSS names the child's kernel stack.
    unsafe { usermode::iret_to_user(entry, mm::USER_STACK_TOP) }
}

/// The `halt` system call; also the exception path's exit (raw status 255
/// becomes the synthesized 256).
///
/// Unwinds the current task: descriptors dropped, user window re-pointed at
/// the parent, and the parent's saved `execute` frame resumed with the
/// status. A boot shell has no parent to resume, so its shell is relaunched
/// instead.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub extern "C" fn do_halt(raw_status: u32) -> i32 {
    crate::arch::disable_interrupts();

    let status = if raw_status == EXCEPTION_RAW_STATUS {
        EXCEPTION_STATUS
    } else {
        (raw_status & 0xFF) as i32
    };

    let pid = table::current_pid();
    let (parent, entry) = table::with(|t| (t.pcb(pid).parent, t.pcb(pid).entry));

    match parent {
        None => {
            // Boot shell: fresh streams, fresh stack, same program image.
            table::with(|t| {
                let pcb = t.pcb_mut(pid);
                pcb.fds.release_all();
                pcb.fds = FdTable::with_std_streams();
                pcb.args.clear();
                pcb.child = None;
            });
            gdt::set_kernel_stack(table::kernel_stack_top(pid));
            // SAFETY: The shell image is still loaded in this terminal's
            // frame and the window still points at it.
            unsafe { usermode::iret_to_user(entry, mm::USER_STACK_TOP) }
        }
        Some(parent_pid) => {
            let (parent_ebp, parent_esp) = table::with(|t| {
                let pcb = t.pcb_mut(pid);
                pcb.fds.release_all();
                pcb.args.clear();
                let frame = (pcb.parent_ebp, pcb.parent_esp);
                t.set_live(pid, false);
                t.pcb_mut(parent_pid).child = None;
                frame
            });

            let _ = mm::map_user_window(parent_pid);
            mm::flush_tlb();
            gdt::set_kernel_stack(table::kernel_stack_top(parent_pid));

            // SAFETY: The frame was saved by the parent's do_execute and
            // lives on the parent's kernel stack, untouched while the child
            // ran on its own stack.
            unsafe { usermode::resume_kernel_frame(parent_ebp, parent_esp, status) }
        }
    }
}

/// Hosted stand-in so the dispatcher links on unit-test builds.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub extern "C" fn do_halt(_raw_status: u32) -> i32 {
    -1
}

/// First ALT+Fn visit to a terminal: mark its boot shell live and enter it.
/// Does not return when a launch happens (interrupt context, the iretd
/// abandons the keyboard handler's frame).
pub fn launch_terminal_if_idle(term: usize) {
    if table::is_live(term) {
        return;
    }

    #[cfg(all(target_arch = "x86", target_os = "none"))]
    {
        table::with(|t| t.set_live(term, true));
        crate::sched::set_executing(term);

        let _ = mm::map_user_window(term);
        mm::flush_tlb();
        mm::map_vidmap(term);
        mm::flush_tlb();

        let entry = table::with(|t| t.pcb(term).entry);
        gdt::set_kernel_stack(table::kernel_stack_top(term));
        // SAFETY: The shell was loaded into this terminal's frame at boot;
        // window and TSS were just pointed at it.
        unsafe { usermode::iret_to_user(entry, mm::USER_STACK_TOP) }
    }
}

/// Boot tail: load one shell per terminal, start the scheduler clock, and
/// drop to user mode on terminal 0.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn spawn_boot_shells() -> ! {
    let rofs = match fs::rofs() {
        Ok(rofs) => rofs,
        Err(err) => panic!("boot: {}", err),
    };
    let dentry = match rofs.dentry_by_name(SHELL) {
        Ok(dentry) => dentry,
        Err(_) => panic!("boot: no shell binary in the filesystem image"),
    };

    let mut entry = 0;
    for term in 0..crate::terminal::NUM_TERMINALS {
        let _ = mm::map_user_window(term);
        mm::flush_tlb();
        entry = match loader::load_program(rofs, dentry.inode) {
            Ok(entry) => entry,
            Err(err) => panic!("boot: shell load failed: {}", err),
        };
        table::with(|t| {
            let pcb = t.pcb_mut(term);
            *pcb = Pcb::new(term);
            pcb.fds = FdTable::with_std_streams();
            pcb.entry = entry;
        });
    }

    // Terminal 0 runs first; 1 and 2 wake lazily on their first ALT+Fn.
    let _ = mm::map_user_window(0);
    mm::flush_tlb();
    table::with(|t| t.set_live(0, true));
    crate::sched::set_executing(0);
    gdt::set_kernel_stack(table::kernel_stack_top(0));

    crate::arch::x86::pit::init();
    log::info!("boot: three shells staged, entering terminal 0");

    // SAFETY: Shell loaded and mapped for PID 0; TSS names PID 0's stack.
    unsafe { usermode::iret_to_user(entry, mm::USER_STACK_TOP) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::fs::rofs::tests::build_image;

    fn mount_test_image() {
        // ELF magic, padding to offset 24, then the entry word.
        let mut shell = std::vec::Vec::new();
        shell.extend_from_slice(&loader::ELF_MAGIC);
        shell.resize(24, 0);
        shell.extend_from_slice(&0x0804_8010u32.to_le_bytes());
        shell.resize(64, 0x90);

        let image = build_image(&[
            (b"shell", 2, &shell),
            (b"notes.txt", 2, b"just text, not a program"),
            (b".", 1, b""),
        ]);
        let leaked: &'static [u8] = std::boxed::Box::leak(image.into_boxed_slice());
        let _ = crate::fs::init_for_tests(leaked);
    }

    #[test]
    fn prepare_vets_name_and_magic() {
        mount_test_image();

        let plan = prepare(b"shell").expect("shell resolves");
        assert_eq!(plan.args, b"");

        let plan = prepare(b"shell one two").expect("args pass through");
        assert_eq!(plan.args, b"one two");

        assert!(matches!(
            prepare(b"missing"),
            Err(KernelError::Fs(FsError::NotFound))
        ));
        assert_eq!(prepare(b"notes.txt").unwrap_err(), KernelError::NotExecutable);
        assert!(matches!(
            prepare(b"   "),
            Err(KernelError::InvalidArgument { .. })
        ));
    }
}
