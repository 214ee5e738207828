// Hardware drivers: chip-level and protocol-level, board-independent.
//
// Each module is reusable across boards; only pin assignments and bus
// wiring (in board/) are board-specific.

pub mod fat;
pub mod input;
pub mod sdcard;
pub mod storage;
pub mod xl9555;

#[cfg(test)]
pub(crate) mod ramdisk;
