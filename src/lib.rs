// Key, XL9555 expander and SD card support for the ESP32-S3 dev board
//
// Without the `esp32s3` feature this is a plain no_std driver library
// and its tests run on the host.

#![cfg_attr(not(test), no_std)]

pub mod apps;
pub mod board;
pub mod drivers;
