// Debounced key input from the Boot pin and the expander keys
//
// Two sources, one key at a time:
//   Boot     (GPIO0): direct pin read, active low
//   KEY0..3  (XL9555 P17..P14): one best-effort read of input port 1
//
// A failed expander read counts as 0xFF, which decodes as "nothing
// pressed". It is logged once when the expander drops out and once when
// it answers again, not on every poll.
// 30ms debounce, 1s long press, 150ms repeat. The caller supplies time.

use core::fmt;

use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::board::button::{Button, decode_port1};
use crate::drivers::xl9555::{NO_DATA, Register, Xl9555};

const DEBOUNCE_MS: u64 = 30;
const LONG_PRESS_MS: u64 = 1000;
const REPEAT_MS: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Press(Button),
    Release(Button),
    LongPress(Button),
    Repeat(Button),
}

struct EventQueue {
    buf: [Option<Event>; 2],
}

impl EventQueue {
    const fn new() -> Self {
        Self { buf: [None; 2] }
    }

    fn push(&mut self, ev: Event) {
        for slot in self.buf.iter_mut() {
            if slot.is_none() {
                *slot = Some(ev);
                return;
            }
        }
    }

    fn pop(&mut self) -> Option<Event> {
        for slot in self.buf.iter_mut() {
            if let Some(ev) = slot.take() {
                return Some(ev);
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.buf.iter().all(|s| s.is_none())
    }
}

pub struct InputDriver<KEY> {
    boot: KEY,
    stable: Option<Button>,
    candidate: Option<Button>,
    candidate_since: u64,
    press_since: u64,
    long_press_fired: bool,
    last_repeat: u64,
    expander_ok: bool,
    queue: EventQueue,
}

impl<KEY> InputDriver<KEY>
where
    KEY: InputPin,
{
    pub fn new(boot: KEY, now_ms: u64) -> Self {
        Self {
            boot,
            stable: None,
            candidate: None,
            candidate_since: now_ms,
            press_since: now_ms,
            long_press_fired: false,
            last_repeat: now_ms,
            expander_ok: true,
            queue: EventQueue::new(),
        }
    }

    pub fn poll<I2C, E>(&mut self, expander: &mut Xl9555<I2C>, now_ms: u64) -> Option<Event>
    where
        I2C: I2c<Error = E>,
        E: fmt::Debug,
    {
        if !self.queue.is_empty() {
            return self.queue.pop();
        }

        let raw = self.read_raw(expander);
        let now = now_ms;

        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since = now;
        }

        let debounced = if now.saturating_sub(self.candidate_since) >= DEBOUNCE_MS {
            self.candidate
        } else {
            self.stable
        };

        if debounced != self.stable {
            if let Some(old) = self.stable {
                self.queue.push(Event::Release(old));
            }
            if let Some(new) = debounced {
                self.queue.push(Event::Press(new));
                self.press_since = now;
                self.long_press_fired = false;
                self.last_repeat = now;
            }
            self.stable = debounced;
            return self.queue.pop();
        }

        if let Some(btn) = self.stable {
            let held = now.saturating_sub(self.press_since);

            if !self.long_press_fired && held >= LONG_PRESS_MS {
                self.long_press_fired = true;
                self.last_repeat = now;
                return Some(Event::LongPress(btn));
            }

            if self.long_press_fired && now.saturating_sub(self.last_repeat) >= REPEAT_MS {
                self.last_repeat = now;
                return Some(Event::Repeat(btn));
            }
        }

        None
    }

    fn read_raw<I2C, E>(&mut self, expander: &mut Xl9555<I2C>) -> Option<Button>
    where
        I2C: I2c<Error = E>,
        E: fmt::Debug,
    {
        // a pin read error counts as released
        if self.boot.is_low().unwrap_or(false) {
            return Some(Button::Boot);
        }

        let port1 = match expander.read_register(Register::InputPort1) {
            Ok(value) => {
                if !self.expander_ok {
                    info!("xl9555: keys readable again");
                    self.expander_ok = true;
                }
                value
            }
            Err(e) => {
                if self.expander_ok {
                    warn!("xl9555: key read failed: {}; keys read as released", e);
                    self.expander_ok = false;
                }
                NO_DATA
            }
        };
        decode_port1(port1)
    }

    // false while reads of the expander keys are failing
    pub fn expander_ok(&self) -> bool {
        self.expander_ok
    }

    pub fn is_debouncing(&self) -> bool {
        self.candidate.is_some() && self.candidate != self.stable
    }

    pub fn pressed(&self) -> Option<Button> {
        self.stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::pins;
    use crate::drivers::xl9555::PinMask;
    use crate::drivers::xl9555::tests::LoopbackChip;
    use core::cell::Cell;
    use core::convert::Infallible;

    // GPIO0 stand-in; true = line high (released)
    struct Line<'a>(&'a Cell<bool>);

    impl embedded_hal::digital::ErrorType for Line<'_> {
        type Error = Infallible;
    }

    impl InputPin for Line<'_> {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    fn drive_key(dev: Xl9555<LoopbackChip>, key: PinMask, pressed: bool) -> Xl9555<LoopbackChip> {
        let mut chip = dev.release();
        chip.set_external(key, !pressed);
        Xl9555::new(chip)
    }

    #[test]
    fn boot_key_press_hold_and_release() {
        let boot = Cell::new(true);
        let mut xl = Xl9555::new(LoopbackChip::new());
        let mut input = InputDriver::new(Line(&boot), 0);

        assert_eq!(input.poll(&mut xl, 0), None);

        boot.set(false);
        assert_eq!(input.poll(&mut xl, 10), None);
        assert!(input.is_debouncing());
        assert_eq!(input.poll(&mut xl, 40), Some(Event::Press(Button::Boot)));
        assert_eq!(input.pressed(), Some(Button::Boot));

        assert_eq!(input.poll(&mut xl, 500), None);
        assert_eq!(input.poll(&mut xl, 1040), Some(Event::LongPress(Button::Boot)));
        assert_eq!(input.poll(&mut xl, 1100), None);
        assert_eq!(input.poll(&mut xl, 1190), Some(Event::Repeat(Button::Boot)));

        boot.set(true);
        assert_eq!(input.poll(&mut xl, 1200), None);
        assert_eq!(input.poll(&mut xl, 1230), Some(Event::Release(Button::Boot)));
        assert_eq!(input.pressed(), None);
    }

    #[test]
    fn short_glitch_is_filtered() {
        let boot = Cell::new(true);
        let mut xl = Xl9555::new(LoopbackChip::new());
        let mut input = InputDriver::new(Line(&boot), 0);

        boot.set(false);
        assert_eq!(input.poll(&mut xl, 100), None);
        boot.set(true);
        assert_eq!(input.poll(&mut xl, 110), None);
        assert_eq!(input.poll(&mut xl, 200), None);
        assert_eq!(input.pressed(), None);
    }

    #[test]
    fn expander_keys_are_read_from_port1() {
        let boot = Cell::new(true);
        let mut xl = Xl9555::new(LoopbackChip::new());
        let mut input = InputDriver::new(Line(&boot), 0);

        xl = drive_key(xl, pins::KEY2, true);
        assert_eq!(input.poll(&mut xl, 0), None);
        assert_eq!(input.poll(&mut xl, 30), Some(Event::Press(Button::Key2)));

        // KEY0 outranks KEY2 once both are down
        xl = drive_key(xl, pins::KEY0, true);
        assert_eq!(input.poll(&mut xl, 40), None);
        assert_eq!(input.poll(&mut xl, 70), Some(Event::Release(Button::Key2)));
        assert_eq!(input.poll(&mut xl, 71), Some(Event::Press(Button::Key0)));
    }

    #[test]
    fn missing_expander_reads_as_released() {
        let boot = Cell::new(true);
        let mut xl = Xl9555::new(LoopbackChip::absent());
        let mut input = InputDriver::new(Line(&boot), 0);

        for t in (0..200).step_by(10) {
            assert_eq!(input.poll(&mut xl, t), None);
        }
        assert!(!input.expander_ok());
    }

    #[test]
    fn expander_coming_back_is_noticed() {
        let boot = Cell::new(true);
        let mut xl = Xl9555::new(LoopbackChip::absent());
        let mut input = InputDriver::new(Line(&boot), 0);
        assert!(input.expander_ok());

        assert_eq!(input.poll(&mut xl, 0), None);
        assert_eq!(input.poll(&mut xl, 10), None);
        assert!(!input.expander_ok());

        let mut xl = Xl9555::new(LoopbackChip::new());
        xl = drive_key(xl, pins::KEY1, true);
        assert_eq!(input.poll(&mut xl, 20), None);
        assert!(input.expander_ok());
        assert_eq!(input.poll(&mut xl, 50), Some(Event::Press(Button::Key1)));
    }
}
