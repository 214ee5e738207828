// XL9555 16-bit I2C GPIO expander (board-independent)
// Two 8-bit ports behind 8 one-byte registers. The driver keeps no
// copy of chip state; every pin operation is a read-modify-write.
//
// Pin masks: low byte = port 0, high byte = port 1. A mask may carry
// several bits as long as they all sit in the same port.

use core::fmt;
use core::ops::BitOr;

use embedded_hal::digital::PinState;
use embedded_hal::i2c::I2c;
use log::{debug, warn};

// 7-bit slave address with A0..A2 strapped low
pub const XL9555_ADDR: u8 = 0x20;

// bus clock the board runs the expander at
pub const I2C_FREQ_HZ: u32 = 40_000;

// returned by the best-effort read when the transfer fails
pub const NO_DATA: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    InputPort0 = 0,
    InputPort1 = 1,
    OutputPort0 = 2,
    OutputPort1 = 3,
    // input polarity; a set bit reads the pin inverted
    InversionPort0 = 4,
    InversionPort1 = 5,
    // direction; 1 = input, 0 = output
    ConfigPort0 = 6,
    ConfigPort1 = 7,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }

    pub const fn input(port: Port) -> Self {
        match port {
            Port::P0 => Register::InputPort0,
            Port::P1 => Register::InputPort1,
        }
    }

    pub const fn output(port: Port) -> Self {
        match port {
            Port::P0 => Register::OutputPort0,
            Port::P1 => Register::OutputPort1,
        }
    }

    pub const fn inversion(port: Port) -> Self {
        match port {
            Port::P0 => Register::InversionPort0,
            Port::P1 => Register::InversionPort1,
        }
    }

    pub const fn config(port: Port) -> Self {
        match port {
            Port::P0 => Register::ConfigPort0,
            Port::P1 => Register::ConfigPort1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    P0,
    P1,
}

impl Port {
    pub const fn index(self) -> u8 {
        match self {
            Port::P0 => 0,
            Port::P1 => 1,
        }
    }

    // any non-zero index selects port 1
    pub const fn from_index(index: u8) -> Self {
        if index == 0 { Port::P0 } else { Port::P1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

/// One or more expander pins inside a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMask(u16);

impl PinMask {
    pub const P00: Self = Self(0x0001);
    pub const P01: Self = Self(0x0002);
    pub const P02: Self = Self(0x0004);
    pub const P03: Self = Self(0x0008);
    pub const P04: Self = Self(0x0010);
    pub const P05: Self = Self(0x0020);
    pub const P06: Self = Self(0x0040);
    pub const P07: Self = Self(0x0080);
    pub const P10: Self = Self(0x0100);
    pub const P11: Self = Self(0x0200);
    pub const P12: Self = Self(0x0400);
    pub const P13: Self = Self(0x0800);
    pub const P14: Self = Self(0x1000);
    pub const P15: Self = Self(0x2000);
    pub const P16: Self = Self(0x4000);
    pub const P17: Self = Self(0x8000);

    pub const PORT0_ALL: Self = Self(0x00FF);
    pub const PORT1_ALL: Self = Self(0xFF00);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    // single pin by port and bit number (0..=7)
    pub const fn pin(port: Port, bit: u8) -> Self {
        let mask = 1u16 << (bit & 7);
        match port {
            Port::P0 => Self(mask),
            Port::P1 => Self(mask << 8),
        }
    }

    /// Port and in-port bit pattern, or `None` for an empty mask or one
    /// that spans both ports.
    pub const fn split(self) -> Option<(Port, u8)> {
        let lo = (self.0 & 0x00FF) as u8;
        let hi = (self.0 >> 8) as u8;
        match (lo, hi) {
            (0, 0) => None,
            (lo, 0) => Some((Port::P0, lo)),
            (0, hi) => Some((Port::P1, hi)),
            _ => None,
        }
    }
}

impl BitOr for PinMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    I2c(E),
    EmptyMask,
    // mask has bits in both ports; one call per port
    MixedPorts(u16),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "i2c transfer failed: {:?}", e),
            Error::EmptyMask => write!(f, "empty pin mask"),
            Error::MixedPorts(bits) => write!(f, "pin mask {:#06x} spans both ports", bits),
        }
    }
}

pub struct Xl9555<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Xl9555<I2C>
where
    I2C: I2c<Error = E>,
    E: fmt::Debug,
{
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, XL9555_ADDR)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    // read both input ports once; the read clears a latched interrupt
    pub fn init(&mut self) -> Result<u16, Error<E>> {
        let inputs = self.read_inputs()?;
        debug!("xl9555 @{:#04x}: inputs {:#06x}", self.address, inputs);
        Ok(inputs)
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &[reg.addr(), value])
            .map_err(Error::I2c)
    }

    // register pointer write, repeated start, one byte back
    pub fn read_register(&mut self, reg: Register) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg.addr()], &mut buf)
            .map_err(Error::I2c)?;
        Ok(buf[0])
    }

    /// Best-effort read: a failed transfer is logged and reads as
    /// [`NO_DATA`], which cannot be told apart from a real `0xFF`.
    pub fn read_register_or_no_data(&mut self, reg: Register) -> u8 {
        match self.read_register(reg) {
            Ok(value) => value,
            Err(e) => {
                warn!("xl9555: read {:?} failed: {}", reg, e);
                NO_DATA
            }
        }
    }

    pub fn write_port(&mut self, port: Port, value: u8) -> Result<(), Error<E>> {
        self.write_register(Register::output(port), value)
    }

    pub fn read_port(&mut self, port: Port) -> Result<u8, Error<E>> {
        self.read_register(Register::input(port))
    }

    // port 1 in the high byte, same layout as PinMask
    pub fn read_inputs(&mut self) -> Result<u16, Error<E>> {
        let p0 = self.read_port(Port::P0)?;
        let p1 = self.read_port(Port::P1)?;
        Ok(u16::from(p1) << 8 | u16::from(p0))
    }

    pub fn configure_pin_direction(
        &mut self,
        pins: PinMask,
        direction: Direction,
    ) -> Result<(), Error<E>> {
        self.update_bits(pins, Register::config, direction == Direction::Input)
    }

    pub fn set_pin(&mut self, pins: PinMask, level: PinState) -> Result<(), Error<E>> {
        self.update_bits(pins, Register::output, level == PinState::High)
    }

    pub fn get_pin(&mut self, pin: PinMask) -> Result<bool, Error<E>> {
        let (port, bits) = split_mask(pin)?;
        let value = self.read_register(Register::input(port))?;
        Ok((value & bits) != 0)
    }

    pub fn set_polarity_inversion(
        &mut self,
        pins: PinMask,
        inverted: bool,
    ) -> Result<(), Error<E>> {
        self.update_bits(pins, Register::inversion, inverted)
    }

    // read-modify-write touching only the masked bits
    fn update_bits(
        &mut self,
        pins: PinMask,
        register_for: fn(Port) -> Register,
        set: bool,
    ) -> Result<(), Error<E>> {
        let (port, bits) = split_mask(pins)?;
        let reg = register_for(port);
        let current = self.read_register(reg)?;
        let next = if set { current | bits } else { current & !bits };
        self.write_register(reg, next)
    }
}

fn split_mask<E>(pins: PinMask) -> Result<(Port, u8), Error<E>> {
    if pins.bits() == 0 {
        return Err(Error::EmptyMask);
    }
    pins.split().ok_or(Error::MixedPorts(pins.bits()))
}
