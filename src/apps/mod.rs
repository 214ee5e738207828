// Firmware routines built on the drivers; nothing here touches esp-hal.

pub mod sd_demo;
