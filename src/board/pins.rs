//! GPIO |     Function    |      Notes
//! -----+-----------------+----------------------------------
//!  0   | Boot key        | Active LOW, internal pullup
//!  0   | XL9555 INT      | Jumpered onto GPIO0, open drain, active LOW
//!  2   | SD CS           | SD card chip select
//! 11   | SPI2 MOSI       | SD card data in
//! 12   | SPI2 SCK        | SD card clock
//! 13   | SPI2 MISO       | SD card data out
//! 41   | I2C0 SDA        | XL9555 (0x20), ES8388
//! 42   | I2C0 SCL        |
//!
//! XL9555 |  Function  |  Notes
//! -------+------------+----------------------------------
//!  P00   | AP_INT     | AP3216C interrupt
//!  P01   | QMA_INT    | QMA6100P interrupt
//!  P02   | SPK_EN     | Speaker amplifier enable
//!  P03   | BEEP       | Buzzer
//!  P04   | OV_PWDN    | Camera power down
//!  P05   | OV_RESET   | Camera reset
//!  P06   | GBC_LED    | ATK module LED
//!  P07   | GBC_KEY    | ATK module key
//!  P10   | LCD_BL     | RGB LCD backlight
//!  P11   | CT_RST     | Touch controller reset
//!  P12   | SLCD_RST   | SPI LCD reset
//!  P13   | SLCD_PWR   | SPI LCD backlight
//!  P14   | KEY3       | Active LOW
//!  P15   | KEY2       | Active LOW
//!  P16   | KEY1       | Active LOW
//!  P17   | KEY0       | Active LOW

use crate::drivers::xl9555::PinMask;

// ----- Keys -----
pub const KEY_BOOT: u8 = 0;

// ----- I2C bus -----
pub const I2C_SDA: u8 = 41;
pub const I2C_SCL: u8 = 42;
pub const EXIO_INT: u8 = 0; // shares the Boot key line

// ----- SD Card (SPI2) -----
pub const SD_CS: u8 = 2;
pub const SD_MISO: u8 = 13;
pub const SD_MOSI: u8 = 11;
pub const SD_SCK: u8 = 12;

// ----- XL9555 lines -----
pub const AP_INT: PinMask = PinMask::P00;
pub const QMA_INT: PinMask = PinMask::P01;
pub const SPK_EN: PinMask = PinMask::P02;
pub const BEEP: PinMask = PinMask::P03;
pub const OV_PWDN: PinMask = PinMask::P04;
pub const OV_RESET: PinMask = PinMask::P05;
pub const GBC_LED: PinMask = PinMask::P06;
pub const GBC_KEY: PinMask = PinMask::P07;
pub const LCD_BL: PinMask = PinMask::P10;
pub const CT_RST: PinMask = PinMask::P11;
pub const SLCD_RST: PinMask = PinMask::P12;
pub const SLCD_PWR: PinMask = PinMask::P13;
pub const KEY3: PinMask = PinMask::P14;
pub const KEY2: PinMask = PinMask::P15;
pub const KEY1: PinMask = PinMask::P16;
pub const KEY0: PinMask = PinMask::P17;
