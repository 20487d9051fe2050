//! The three logical terminals.
//!
//! Exactly one terminal is *displayed*: its cell contents live in the
//! physical VGA bank while the other two keep theirs in 4 KiB-aligned
//! mirrors. Each terminal owns a 128-byte line buffer fed by the keyboard
//! interrupt (displayed terminal only) and drained by `terminal_read` in
//! the task executing on that terminal.
//!
//! Lock discipline: all state sits behind one spin mutex taken with
//! interrupts disabled, because the keyboard IRQ mutates the same records.
//! Never take the process-table lock while holding this one.

use core::fmt::{self, Write};

use spin::Mutex;

use crate::console::{self, Cursor, Screen};

/// Number of logical terminals sharing the screen.
pub const NUM_TERMINALS: usize = 3;

/// Line buffer capacity; the last byte is reserved so a full line can still
/// be terminated with `\n`.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Keyboard line buffer with enter accounting.
#[derive(Clone, Copy)]
pub struct LineBuffer {
    buf: [u8; LINE_BUFFER_SIZE],
    len: usize,
    pending_lines: usize,
}

impl LineBuffer {
    pub const fn new() -> Self {
        LineBuffer {
            buf: [0; LINE_BUFFER_SIZE],
            len: 0,
            pending_lines: 0,
        }
    }

    /// Append a printable byte. Byte 127 stays reserved for the newline.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len < LINE_BUFFER_SIZE - 1 {
            self.buf[self.len] = byte;
            self.len += 1;
            true
        } else {
            false
        }
    }

    /// Terminate the current line. Uses the reserved slot if necessary.
    pub fn push_newline(&mut self) -> bool {
        if self.len < LINE_BUFFER_SIZE {
            self.buf[self.len] = b'\n';
            self.len += 1;
            self.pending_lines += 1;
            true
        } else {
            false
        }
    }

    /// Drop the last un-entered byte.
    pub fn backspace(&mut self) -> bool {
        // Completed lines are already owned by a pending read.
        if self.len > 0 && self.buf[self.len - 1] != b'\n' {
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// Whether a full `\n`-terminated line is waiting.
    pub fn has_line(&self) -> bool {
        self.pending_lines > 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.pending_lines = 0;
    }

    /// Dequeue the oldest line into `dst`.
    ///
    /// Copies up to `dst.len()` bytes ending (capacity permitting) in the
    /// `\n`; the whole line, including any tail the caller's buffer could
    /// not hold, is removed from the buffer. Returns the bytes copied.
    pub fn take_line(&mut self, dst: &mut [u8]) -> usize {
        debug_assert!(self.has_line());
        let newline = match self.buf[..self.len].iter().position(|&b| b == b'\n') {
            Some(index) => index,
            None => return 0,
        };
        let line_len = newline + 1;
        let copied = line_len.min(dst.len());
        dst[..copied].copy_from_slice(&self.buf[..copied]);

        self.buf.copy_within(line_len..self.len, 0);
        self.len -= line_len;
        self.pending_lines -= 1;
        copied
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One logical console: cursor, off-screen cell mirror, line buffer.
pub struct Terminal {
    pub cursor: Cursor,
    pub screen: Screen,
    pub line: LineBuffer,
}

impl Terminal {
    const fn new() -> Self {
        Terminal {
            cursor: Cursor { x: 0, y: 0 },
            screen: Screen::blank(),
            line: LineBuffer::new(),
        }
    }
}

/// All three terminals plus the displayed-terminal id, guarded as one unit.
pub struct TerminalSet {
    terms: [Terminal; NUM_TERMINALS],
    displayed: usize,
}

impl TerminalSet {
    const fn new() -> Self {
        TerminalSet {
            terms: [Terminal::new(), Terminal::new(), Terminal::new()],
            displayed: 0,
        }
    }

    pub fn displayed_id(&self) -> usize {
        self.displayed
    }

    pub fn terminal(&self, id: usize) -> &Terminal {
        &self.terms[id]
    }

    /// Write bytes on behalf of the task executing on terminal `id`:
    /// to the VGA bank when `id` is displayed, to `id`'s mirror otherwise.
    pub fn write_bytes(&mut self, id: usize, bytes: &[u8]) {
        let displayed = id == self.displayed;
        let term = &mut self.terms[id];
        let screen: &mut Screen = if displayed {
            console::vga_screen()
        } else {
            &mut term.screen
        };
        for &byte in bytes {
            console::put_byte(screen, &mut term.cursor, byte);
        }
        if displayed {
            console::update_hw_cursor(term.cursor);
        }
    }

    /// Append a printable byte to the displayed terminal's line buffer,
    /// echoing it when accepted.
    pub fn push_input(&mut self, byte: u8) {
        let id = self.displayed;
        if self.terms[id].line.push(byte) {
            self.write_bytes(id, &[byte]);
        }
    }

    /// Terminate the displayed terminal's line, echoing the newline when the
    /// buffer accepts it.
    pub fn push_enter(&mut self) {
        let id = self.displayed;
        if self.terms[id].line.push_newline() {
            self.write_bytes(id, b"\n");
        }
    }

    /// Remove the last buffered byte and erase its echoed cell.
    pub fn apply_backspace(&mut self) {
        let id = self.displayed;
        if self.terms[id].line.backspace() {
            let term = &mut self.terms[id];
            console::backspace(console::vga_screen(), &mut term.cursor);
            console::update_hw_cursor(term.cursor);
        }
    }

    /// CTRL+L: blank the displayed screen and discard its pending input.
    pub fn clear_displayed(&mut self) {
        let id = self.displayed;
        let term = &mut self.terms[id];
        console::clear(console::vga_screen(), &mut term.cursor);
        console::update_hw_cursor(term.cursor);
        term.line.clear();
    }

    /// Hot-switch the displayed terminal: park the outgoing contents in its
    /// mirror, surface the incoming mirror on the VGA bank.
    pub fn switch_displayed(&mut self, new: usize) {
        if new >= NUM_TERMINALS || new == self.displayed {
            return;
        }
        let old = self.displayed;
        self.terms[old].screen.copy_from(console::vga_screen());
        console::vga_screen().copy_from(&self.terms[new].screen);
        self.displayed = new;
        console::update_hw_cursor(self.terms[new].cursor);
    }
}

static TERMINALS: Mutex<TerminalSet> = Mutex::new(TerminalSet::new());

/// Run `f` against the terminal set with interrupts disabled.
pub fn with<R>(f: impl FnOnce(&mut TerminalSet) -> R) -> R {
    crate::arch::without_interrupts(|| f(&mut TERMINALS.lock()))
}

/// Id of the currently displayed terminal.
pub fn displayed_id() -> usize {
    with(|set| set.displayed_id())
}

/// Address of terminal `id`'s mirror bank. With the kernel identity-mapped
/// this doubles as the physical address the vidmap table points at.
pub fn mirror_address(id: usize) -> usize {
    with(|set| &set.terms[id].screen as *const Screen as usize)
}

/// `write` on stdout: copy every byte to the screen or mirror of the
/// writing task's terminal. Interrupts stay off for the whole copy, so
/// writes from different tasks interleave at whole-call granularity.
pub fn terminal_write(id: usize, bytes: &[u8]) -> usize {
    with(|set| {
        set.write_bytes(id, bytes);
        bytes.len()
    })
}

/// `read` on stdin: block until terminal `id` is displayed *and* has a
/// completed line, then dequeue it.
///
/// Busy-waits with interrupts explicitly enabled between polls (system
/// calls arrive with them off); the timer keeps scheduling other
/// terminals' tasks while this one spins. Returns with interrupts off,
/// like any other system-call body.
pub fn terminal_read(id: usize, dst: &mut [u8]) -> usize {
    loop {
        crate::arch::disable_interrupts();
        let taken = {
            let mut set = TERMINALS.lock();
            if set.displayed == id && set.terms[id].line.has_line() {
                Some(set.terms[id].line.take_line(dst))
            } else {
                None
            }
        };
        if let Some(count) = taken {
            return count;
        }
        crate::arch::enable_interrupts();
        core::hint::spin_loop();
    }
}

struct SetWriter<'a> {
    set: &'a mut TerminalSet,
}

impl fmt::Write for SetWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let id = self.set.displayed_id();
        self.set.write_bytes(id, s.as_bytes());
        Ok(())
    }
}

/// Kernel `print!` target: the displayed terminal.
pub fn write_displayed_fmt(args: fmt::Arguments) {
    with(|set| {
        let _ = SetWriter { set }.write_fmt(args);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_reserves_newline_slot() {
        let mut line = LineBuffer::new();
        for i in 0..LINE_BUFFER_SIZE {
            let accepted = line.push(b'a');
            if i < LINE_BUFFER_SIZE - 1 {
                assert!(accepted, "byte {} should fit", i);
            } else {
                assert!(!accepted, "byte {} must be rejected", i);
            }
        }
        assert_eq!(line.len(), LINE_BUFFER_SIZE - 1);
        // The reserved slot still takes the newline.
        assert!(line.push_newline());
        assert!(line.has_line());
    }

    #[test]
    fn take_line_returns_bytes_ending_in_newline() {
        let mut line = LineBuffer::new();
        for &b in b"hello" {
            assert!(line.push(b));
        }
        assert!(!line.has_line());
        assert!(line.push_newline());

        let mut dst = [0u8; 64];
        let n = line.take_line(&mut dst);
        assert_eq!(n, 6);
        assert_eq!(&dst[..n], b"hello\n");
        assert!(line.is_empty());
        assert!(!line.has_line());
    }

    #[test]
    fn take_line_clamps_to_caller_buffer_but_consumes_line() {
        let mut line = LineBuffer::new();
        for &b in b"abcdef" {
            assert!(line.push(b));
        }
        assert!(line.push_newline());

        let mut dst = [0u8; 3];
        let n = line.take_line(&mut dst);
        assert_eq!(n, 3);
        assert_eq!(&dst, b"abc");
        // The unread tail is discarded with the line.
        assert!(line.is_empty());
    }

    #[test]
    fn take_line_leaves_following_input_queued() {
        let mut line = LineBuffer::new();
        for &b in b"one" {
            assert!(line.push(b));
        }
        assert!(line.push_newline());
        for &b in b"tw" {
            assert!(line.push(b));
        }

        let mut dst = [0u8; 16];
        let n = line.take_line(&mut dst);
        assert_eq!(&dst[..n], b"one\n");
        assert_eq!(line.len(), 2);
        assert!(!line.has_line());
    }

    #[test]
    fn backspace_stops_at_completed_lines() {
        let mut line = LineBuffer::new();
        assert!(line.push(b'x'));
        assert!(line.push_newline());
        // The entered line must stay intact.
        assert!(!line.backspace());
        assert!(line.push(b'y'));
        assert!(line.backspace());
        assert!(!line.backspace());
    }

    // The one test that touches the global terminal set; everything it
    // needs happens in sequence here to keep the harness race-free.
    #[test]
    fn writes_route_to_vga_or_mirror_and_switch_swaps_them() {
        // Terminal 1 is off-screen: bytes land in its mirror.
        assert_eq!(terminal_write(1, b"hi"), 2);
        with(|set| {
            assert_eq!(set.terminal(1).screen.cell(0, 0).character, b'h');
            assert_eq!(set.terminal(1).screen.cell(1, 0).character, b'i');
            assert_eq!(set.terminal(1).cursor, Cursor { x: 2, y: 0 });
        });

        // Terminal 0 is displayed: bytes land in the VGA bank, not its
        // mirror.
        assert_eq!(terminal_write(0, b"A"), 1);
        with(|set| {
            assert_eq!(set.terminal(0).screen.cell(0, 0).character, b' ');
        });
        assert_eq!(console::vga_screen().cell(0, 0).character, b'A');

        // Hot switch: the outgoing screen parks in its mirror, the incoming
        // mirror surfaces.
        with(|set| set.switch_displayed(1));
        assert_eq!(displayed_id(), 1);
        assert_eq!(console::vga_screen().cell(0, 0).character, b'h');
        with(|set| {
            assert_eq!(set.terminal(0).screen.cell(0, 0).character, b'A');
        });

        // And back.
        with(|set| set.switch_displayed(0));
        assert_eq!(displayed_id(), 0);
        assert_eq!(console::vga_screen().cell(0, 0).character, b'A');
    }

    #[test]
    fn clear_discards_pending_lines() {
        let mut line = LineBuffer::new();
        assert!(line.push(b'x'));
        assert!(line.push_newline());
        line.clear();
        assert!(!line.has_line());
        assert!(line.is_empty());
    }
}
