//! Key definitions for the ESP32-S3 dev board
//!
//! The Boot key sits directly on GPIO0. KEY0..KEY3 hang off the XL9555
//! expander, port 1, so one input-port read covers all four. Every key
//! pulls its line low when pressed.

use super::pins;
use crate::drivers::xl9555::PinMask;

/// All physical keys on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    // GPIO0
    Boot,
    // XL9555 P17..P14
    Key0,
    Key1,
    Key2,
    Key3,
}

impl Button {
    pub const fn name(self) -> &'static str {
        match self {
            Button::Boot => "Boot",
            Button::Key0 => "KEY0",
            Button::Key1 => "KEY1",
            Button::Key2 => "KEY2",
            Button::Key3 => "KEY3",
        }
    }
}

impl core::fmt::Display for Button {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// expander keys in priority order
pub const EXPANDER_KEYS: &[(PinMask, Button)] = &[
    (pins::KEY0, Button::Key0),
    (pins::KEY1, Button::Key1),
    (pins::KEY2, Button::Key2),
    (pins::KEY3, Button::Key3),
];

// decode an input port 1 reading; a cleared bit is a pressed key
pub fn decode_port1(value: u8) -> Option<Button> {
    for &(pin, button) in EXPANDER_KEYS {
        let bits = (pin.bits() >> 8) as u8;
        if value & bits == 0 {
            return Some(button);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_port_decodes_to_nothing() {
        assert_eq!(decode_port1(0xFF), None);
        // low nibble belongs to LCD lines, not keys
        assert_eq!(decode_port1(0xF0), None);
    }

    #[test]
    fn pressed_keys_decode_in_priority_order() {
        assert_eq!(decode_port1(0x7F), Some(Button::Key0));
        assert_eq!(decode_port1(0xBF), Some(Button::Key1));
        assert_eq!(decode_port1(0xDF), Some(Button::Key2));
        assert_eq!(decode_port1(0xEF), Some(Button::Key3));
        assert_eq!(decode_port1(0xCF), Some(Button::Key2));
        assert_eq!(decode_port1(0x0F), Some(Button::Key0));
    }

    #[test]
    fn display_uses_silkscreen_names() {
        assert_eq!(std::format!("{}", Button::Key3), "KEY3");
        assert_eq!(Button::Boot.name(), "Boot");
    }
}
