//! The PCB arena and the kernel-stack address map.
//!
//! One slot per PID plus a liveness bitmap, all behind a single lock taken
//! with interrupts disabled (the scheduler walks the arena from the timer
//! interrupt). Blocking operations must never run under [`with`]; callers
//! copy what they need out, drop the lock, and write back after.

use spin::Mutex;

use super::pcb::Pcb;
use super::MAX_PROCESSES;

/// Top of the kernel region; stacks descend from here.
const KERNEL_TOP: u32 = 0x80_0000;
/// Per-task kernel stack size.
const KERNEL_STACK_SIZE: u32 = 0x2000;

/// Ring-0 stack pointer for PID `pid`: the top word of its 8 KiB block at
/// `8 MiB - (pid + 1) * 8 KiB`.
pub fn kernel_stack_top(pid: usize) -> u32 {
    KERNEL_TOP - pid as u32 * KERNEL_STACK_SIZE - 4
}

/// Liveness bitmap plus the seven PCB slots.
pub struct ProcessTable {
    live: [bool; MAX_PROCESSES],
    pcbs: [Pcb; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        ProcessTable {
            live: [false; MAX_PROCESSES],
            pcbs: [
                Pcb::new(0),
                Pcb::new(1),
                Pcb::new(2),
                Pcb::new(3),
                Pcb::new(4),
                Pcb::new(5),
                Pcb::new(6),
            ],
        }
    }

    pub fn is_live(&self, pid: usize) -> bool {
        self.live[pid]
    }

    pub fn set_live(&mut self, pid: usize, live: bool) {
        self.live[pid] = live;
    }

    /// Claim the lowest free dynamic PID (3..6), marking it live.
    pub fn allocate_user_pid(&mut self) -> Option<usize> {
        for pid in 3..MAX_PROCESSES {
            if !self.live[pid] {
                self.live[pid] = true;
                return Some(pid);
            }
        }
        None
    }

    pub fn pcb(&self, pid: usize) -> &Pcb {
        &self.pcbs[pid]
    }

    pub fn pcb_mut(&mut self, pid: usize) -> &mut Pcb {
        &mut self.pcbs[pid]
    }

    /// Deepest descendant of `root`: the task actually executing on that
    /// terminal.
    pub fn leaf_of(&self, root: usize) -> usize {
        let mut pid = root;
        while let Some(child) = self.pcbs[pid].child {
            pid = child;
        }
        pid
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

static TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

/// Run `f` against the arena with interrupts disabled. Keep it short; no
/// blocking inside.
pub fn with<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    crate::arch::without_interrupts(|| f(&mut TABLE.lock()))
}

pub fn is_live(pid: usize) -> bool {
    with(|table| table.is_live(pid))
}

/// PID of the task executing right now: the leaf of the executing
/// terminal's task chain.
pub fn current_pid() -> usize {
    let root = crate::sched::executing_terminal();
    with(|table| table.leaf_of(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_tops_descend_from_eight_mib() {
        assert_eq!(kernel_stack_top(0), 0x7F_FFFC);
        assert_eq!(kernel_stack_top(1), 0x7D_FFFC);
        assert_eq!(kernel_stack_top(6), 0x73_FFFC);
    }

    #[test]
    fn user_pids_allocate_lowest_first() {
        let mut table = ProcessTable::new();
        assert_eq!(table.allocate_user_pid(), Some(3));
        assert_eq!(table.allocate_user_pid(), Some(4));
        table.set_live(3, false);
        assert_eq!(table.allocate_user_pid(), Some(3));
        assert_eq!(table.allocate_user_pid(), Some(5));
        assert_eq!(table.allocate_user_pid(), Some(6));
        // Boot shells never come from the dynamic range.
        assert_eq!(table.allocate_user_pid(), None);
        assert!(!table.is_live(0));
    }

    #[test]
    fn leaf_walk_follows_child_links() {
        let mut table = ProcessTable::new();
        assert_eq!(table.leaf_of(1), 1);

        // Terminal 0's shell ran `shell`, which ran `counter`.
        table.pcb_mut(0).child = Some(3);
        table.pcb_mut(3).parent = Some(0);
        table.pcb_mut(3).child = Some(4);
        table.pcb_mut(4).parent = Some(3);
        assert_eq!(table.leaf_of(0), 4);
        assert_eq!(table.leaf_of(1), 1);

        // Ancestor chain of the leaf ends at the terminal's root.
        let mut pid = 4;
        while let Some(parent) = table.pcb(pid).parent {
            pid = parent;
        }
        assert_eq!(pid, 0);
    }
}
