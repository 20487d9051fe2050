//! Round-robin scheduler over the three terminals.
//!
//! A 100 Hz timer interrupt rotates execution across the terminals whose
//! boot shell is live, always running the *leaf* task of the chosen
//! terminal's execute chain. Each tick saves the interrupted task's
//! EBP/ESP, re-points the user window and the vidmap page for the incoming
//! task, moves the TSS ring-0 stack, and resumes the incoming task's saved
//! frame.
//!
//! Preemption only happens at these ticks, and only when they arrive from
//! user mode or an interrupts-enabled kernel spin; kernel critical sections
//! hold interrupts off and therefore run to completion.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::terminal::NUM_TERMINALS;

/// Terminal whose leaf task the scheduler is currently running.
static EXECUTING: AtomicUsize = AtomicUsize::new(0);

/// Id of the executing terminal.
pub fn executing_terminal() -> usize {
    EXECUTING.load(Ordering::Acquire)
}

/// Hand execution to `term` (boot and terminal-launch paths).
pub fn set_executing(term: usize) {
    EXECUTING.store(term, Ordering::Release);
}

/// Next terminal after `current` whose root task is live, wrapping
/// round-robin. Falls back to `current` when it is the only live one.
pub fn next_executing(current: usize, is_live: impl Fn(usize) -> bool) -> usize {
    for offset in 1..=NUM_TERMINALS {
        let term = (current + offset) % NUM_TERMINALS;
        if is_live(term) {
            return term;
        }
    }
    current
}

/// Timer-interrupt handler body, entered from the IRQ 0 stub.
///
/// The closing `resume_kernel_frame` unwinds into whichever IRQ stub
/// suspended the incoming task; all hardware stubs share one frame layout,
/// so the epilogue matches regardless of which interrupt it was.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub extern "C" fn timer_tick() {
    use crate::arch::x86::{gdt, pic, pit, usermode};
    use crate::process::table;

    pic::send_eoi(pit::TIMER_IRQ);

    let outgoing_term = executing_terminal();
    let outgoing = table::with(|t| t.leaf_of(outgoing_term));

    let (ebp, esp) = usermode::current_frame();
    table::with(|t| {
        let pcb = t.pcb_mut(outgoing);
        pcb.return_ebp = ebp;
        pcb.return_esp = esp;
    });

    let incoming_term = table::with(|t| next_executing(outgoing_term, |id| t.is_live(id)));
    set_executing(incoming_term);
    let incoming = table::with(|t| t.leaf_of(incoming_term));

    let _ = crate::mm::map_user_window(incoming);
    crate::mm::flush_tlb();
    crate::mm::map_vidmap(incoming_term);
    crate::mm::flush_tlb();

    gdt::set_kernel_stack(table::kernel_stack_top(incoming));

    let (return_ebp, return_esp) = table::with(|t| {
        let pcb = t.pcb(incoming);
        (pcb.return_ebp, pcb.return_esp)
    });

    // SAFETY: The incoming frame was saved by a previous tick on the
    // incoming task's own kernel stack. When incoming == outgoing this
    // resumes the frame saved moments ago in this very handler.
    unsafe { usermode::resume_kernel_frame(return_ebp, return_esp, 0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_skips_dead_terminals() {
        let live = [true, false, true];
        assert_eq!(next_executing(0, |id| live[id]), 2);
        assert_eq!(next_executing(2, |id| live[id]), 0);
    }

    #[test]
    fn sole_live_terminal_keeps_running() {
        let live = [true, false, false];
        assert_eq!(next_executing(0, |id| live[id]), 0);
    }

    #[test]
    fn full_rotation_visits_every_live_terminal() {
        let live = [true, true, true];
        let mut term = 0;
        let mut visited = [false; NUM_TERMINALS];
        for _ in 0..NUM_TERMINALS {
            term = next_executing(term, |id| live[id]);
            visited[term] = true;
        }
        assert_eq!(visited, [true, true, true]);
    }
}
