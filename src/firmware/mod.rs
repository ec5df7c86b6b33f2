//! Firmware-facing adapter leaves (C5): BIOS INT 13h, UEFI BLOCK_IO, the
//! El-Torito boot catalog they both consult, and read-only MBR surfacing
//! for the physical disk underneath the VBD.

pub mod bios;
pub mod eltorito;
pub mod mbr;
pub mod uefi;
