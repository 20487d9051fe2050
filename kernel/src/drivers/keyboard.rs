//! PS/2 keyboard driver.
//!
//! Scancodes from port 0x60 are decoded by the `pc_keyboard` crate
//! (ScancodeSet1, US 104-key, control letters mapped to their control
//! codes) into [`KeyAction`]s, which are then applied to the *displayed*
//! terminal: printable bytes append to its line buffer and echo, ENTER
//! completes a line, ALT+F1..F3 hot-switch the displayed terminal.

use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, KeyCode, KeyState, Keyboard, ScancodeSet1};
use spin::Mutex;

use crate::terminal::{self, NUM_TERMINALS};

/// Keyboard line on the master PIC.
pub const KEYBOARD_IRQ: u8 = 1;

/// PS/2 data port.
#[cfg(all(target_arch = "x86", target_os = "none"))]
const KEYBOARD_PORT: u16 = 0x60;

lazy_static! {
    static ref KEYBOARD: Mutex<Decoder> = Mutex::new(Decoder::new());
}

/// What one scancode amounts to once modifiers are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Printable byte for the line buffer.
    Input(u8),
    /// Line terminator.
    Enter,
    /// Remove the last un-entered byte.
    Backspace,
    /// CTRL+L: clear the displayed screen and its pending input.
    ClearScreen,
    /// ALT+F{1,2,3}: change the displayed terminal.
    SwitchTerminal(usize),
}

/// Scancode decoder with the one modifier `pc_keyboard` does not resolve
/// for us: ALT is tracked from raw key events so ALT+function chords can
/// be recognized before unicode translation.
pub struct Decoder {
    keyboard: Keyboard<layouts::Us104Key, ScancodeSet1>,
    alt_held: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            keyboard: Keyboard::new(
                ScancodeSet1::new(),
                layouts::Us104Key,
                HandleControl::MapLettersToUnicode,
            ),
            alt_held: false,
        }
    }

    /// Feed one scancode; returns an action when the byte completes one.
    pub fn decode(&mut self, scancode: u8) -> Option<KeyAction> {
        let event = self.keyboard.add_byte(scancode).ok().flatten()?;

        // Track ALT from the raw event, before process_keyevent eats it.
        if matches!(event.code, KeyCode::LAlt | KeyCode::RAltGr) {
            self.alt_held = event.state != KeyState::Up;
        }

        match self.keyboard.process_keyevent(event)? {
            DecodedKey::RawKey(code) if self.alt_held => match code {
                KeyCode::F1 => Some(KeyAction::SwitchTerminal(0)),
                KeyCode::F2 => Some(KeyAction::SwitchTerminal(1)),
                KeyCode::F3 => Some(KeyAction::SwitchTerminal(2)),
                _ => None,
            },
            DecodedKey::RawKey(_) => None,
            DecodedKey::Unicode(ch) => match ch {
                '\n' | '\r' => Some(KeyAction::Enter),
                '\u{8}' => Some(KeyAction::Backspace),
                // CTRL+L arrives as the control code for 'l'.
                '\u{c}' => Some(KeyAction::ClearScreen),
                // Printable ASCII only; tab, escape and the remaining
                // control combinations are swallowed.
                c if (' '..='\u{7e}').contains(&c) => Some(KeyAction::Input(c as u8)),
                _ => None,
            },
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Unmask the keyboard line.
pub fn init() {
    // Touch the decoder so its first use is not from interrupt context.
    let _ = KEYBOARD.lock();
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::x86::pic::enable_irq(KEYBOARD_IRQ);
}

/// IRQ 1 entry, called from the common interrupt stub.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub extern "C" fn irq_entry() {
    use crate::arch::x86::{inb, pic};

    // SAFETY: Reading the PS/2 data port consumes the pending scancode;
    // this is the defined handshake for IRQ 1.
    let scancode = unsafe { inb(KEYBOARD_PORT) };
    // EOI first: the terminal-switch path may iret into a fresh shell and
    // never come back through this frame.
    pic::send_eoi(KEYBOARD_IRQ);
    handle_scancode(scancode);
}

/// Decode and apply one scancode. Interrupt context.
pub fn handle_scancode(scancode: u8) {
    let action = KEYBOARD.lock().decode(scancode);
    if let Some(action) = action {
        apply(action);
    }
}

fn apply(action: KeyAction) {
    match action {
        KeyAction::Input(byte) => terminal::with(|set| set.push_input(byte)),
        KeyAction::Enter => terminal::with(|set| set.push_enter()),
        KeyAction::Backspace => terminal::with(|set| set.apply_backspace()),
        KeyAction::ClearScreen => terminal::with(|set| set.clear_displayed()),
        KeyAction::SwitchTerminal(id) => {
            if id >= NUM_TERMINALS {
                return;
            }
            terminal::with(|set| set.switch_displayed(id));
            // First visit to this terminal: bring up its shell. Does not
            // return when a launch happens.
            crate::process::lifecycle::launch_terminal_if_idle(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Set-1 make codes used below.
    const SC_A: u8 = 0x1E;
    const SC_L: u8 = 0x26;
    const SC_ENTER: u8 = 0x1C;
    const SC_BACKSPACE: u8 = 0x0E;
    const SC_TAB: u8 = 0x0F;
    const SC_ESC: u8 = 0x01;
    const SC_LSHIFT: u8 = 0x2A;
    const SC_LCTRL: u8 = 0x1D;
    const SC_LALT: u8 = 0x38;
    const SC_F1: u8 = 0x3B;
    const SC_F2: u8 = 0x3C;

    const RELEASE: u8 = 0x80;

    fn feed(decoder: &mut Decoder, codes: &[u8]) -> std::vec::Vec<KeyAction> {
        codes.iter().filter_map(|&c| decoder.decode(c)).collect()
    }

    #[test]
    fn plain_and_shifted_letters() {
        let mut decoder = Decoder::new();
        let actions = feed(
            &mut decoder,
            &[SC_A, SC_A | RELEASE, SC_LSHIFT, SC_A, SC_A | RELEASE, SC_LSHIFT | RELEASE],
        );
        assert_eq!(
            actions,
            [KeyAction::Input(b'a'), KeyAction::Input(b'A')]
        );
    }

    #[test]
    fn enter_backspace_and_swallowed_keys() {
        let mut decoder = Decoder::new();
        let actions = feed(
            &mut decoder,
            &[
                SC_TAB,
                SC_TAB | RELEASE,
                SC_ESC,
                SC_ESC | RELEASE,
                SC_ENTER,
                SC_ENTER | RELEASE,
                SC_BACKSPACE,
                SC_BACKSPACE | RELEASE,
            ],
        );
        assert_eq!(actions, [KeyAction::Enter, KeyAction::Backspace]);
    }

    #[test]
    fn ctrl_l_clears_screen() {
        let mut decoder = Decoder::new();
        let actions = feed(
            &mut decoder,
            &[SC_LCTRL, SC_L, SC_L | RELEASE, SC_LCTRL | RELEASE, SC_L, SC_L | RELEASE],
        );
        assert_eq!(
            actions,
            [KeyAction::ClearScreen, KeyAction::Input(b'l')]
        );
    }

    #[test]
    fn alt_function_keys_switch_terminals() {
        let mut decoder = Decoder::new();
        let actions = feed(
            &mut decoder,
            &[
                SC_LALT,
                SC_F2,
                SC_F2 | RELEASE,
                SC_LALT | RELEASE,
                // Without ALT, F1 does nothing.
                SC_F1,
                SC_F1 | RELEASE,
            ],
        );
        assert_eq!(actions, [KeyAction::SwitchTerminal(1)]);
    }
}
