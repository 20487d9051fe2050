//! Virtual-memory management.

pub mod paging;
pub mod user;

pub use paging::{
    flush_tlb, map_user_window, map_vidmap, PROGRAM_LOAD_ADDR, USER_STACK_TOP, USER_WINDOW_BASE,
    USER_WINDOW_END, VID_MAP_BASE,
};
