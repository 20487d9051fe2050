//! Process model: PCB arena, kernel-stack layout, execute/halt lifecycle.

pub mod lifecycle;
pub mod loader;
pub mod pcb;
pub mod table;

pub use pcb::Pcb;
pub use table::{current_pid, is_live, kernel_stack_top, with};

/// Seven tasks fit the statically partitioned kernel stacks: PIDs 0..2 are
/// the boot shells (one per terminal), 3..6 are assignable by `execute`.
pub const MAX_PROCESSES: usize = 7;

/// Raw halt status the exception path passes in.
pub const EXCEPTION_RAW_STATUS: u32 = 255;

/// Status a parent observes when its child died to an exception.
pub const EXCEPTION_STATUS: i32 = 256;
