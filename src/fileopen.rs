//! File-open interception (C6). Wraps the firmware's volume `Open` entry
//! point so that a handful of configured filenames are served out of a
//! VirtChunk's memory/remap window instead of the real filesystem, without
//! ever touching the real file.
//!
//! This models the vtable-swap UEFI does (`SimpleFileSystem.OpenVolume`'s
//! returned `EFI_FILE_PROTOCOL.Open` entry gets replaced) as an ordinary
//! Rust decision function plus a pseudo-handle type, since this crate is
//! the hosted side of that contract rather than the UEFI shim itself.

use crate::chain::{Chain, VirtChunk};
use crate::engine::PhysicalDisk;
use crate::error::{Result, VentoyError};
use crate::types::VBD_SECTOR_BYTES;
use crate::vbd::VirtualBlockDevice;
use std::cell::Cell;

pub enum OpenOutcome<'a, D: PhysicalDisk> {
    /// Not a configured name (or no FileReplace record at all) — the caller
    /// should fall through to the real `Open`.
    Passthrough,
    Replaced(PseudoFile<'a, D>),
}

/// One instance per surfaced volume. `wrap` is idempotent: calling it again
/// on an already-wrapped volume is a no-op, matching the requirement that
/// re-wrapping never double-chains the `Open` pointer.
pub struct FileOpenInterceptor<'a, D: PhysicalDisk> {
    chain: &'a Chain,
    disk: &'a D,
    wrapped: Cell<bool>,
}

impl<'a, D: PhysicalDisk> FileOpenInterceptor<'a, D> {
    pub fn new(chain: &'a Chain, disk: &'a D) -> Self {
        FileOpenInterceptor {
            chain,
            disk,
            wrapped: Cell::new(false),
        }
    }

    /// Returns `true` if this call newly wrapped the volume, `false` if it
    /// was already wrapped.
    pub fn wrap_open_volume(&self) -> bool {
        if self.wrapped.get() {
            return false;
        }
        self.wrapped.set(true);
        true
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped.get()
    }

    /// Delegates to the original `Open` conceptually (the caller is
    /// expected to have already tried it, or to try it on `Passthrough`),
    /// and additionally checks the single active FileReplace record.
    pub fn open(&self, name: &str) -> OpenOutcome<'a, D> {
        let Some(fr) = &self.chain.file_replace else {
            return OpenOutcome::Passthrough;
        };
        if !fr.matches(name) {
            return OpenOutcome::Passthrough;
        }
        let Some(vc) = self.chain.virt_chunks.get(fr.new_file_virtual_id as usize) else {
            return OpenOutcome::Passthrough;
        };
        OpenOutcome::Replaced(PseudoFile::new(self.chain, self.disk, *vc))
    }
}

/// Serves `VirtChunk` content as a seekable byte stream, covering the
/// range `[mem_sector_start .. remap_sector_end)` — the chunk's mem window
/// immediately followed by its remap window.
pub struct PseudoFile<'a, D: PhysicalDisk> {
    vbd: VirtualBlockDevice<'a, D>,
    start_lba: u64,
    total_bytes: u64,
    pos: u64,
}

impl<'a, D: PhysicalDisk> PseudoFile<'a, D> {
    fn new(chain: &'a Chain, disk: &'a D, vc: VirtChunk) -> Self {
        let mem_range = vc.mem_sector_end.saturating_sub(vc.mem_sector_start);
        let remap_range = vc.remap_sector_end.saturating_sub(vc.remap_sector_start);
        let start_lba = if vc.has_mem_window() {
            vc.mem_sector_start
        } else {
            vc.remap_sector_start
        };
        PseudoFile {
            vbd: VirtualBlockDevice::new(chain, disk),
            start_lba,
            total_bytes: (mem_range + remap_range) * VBD_SECTOR_BYTES,
            pos: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.total_bytes
    }

    pub fn get_position(&self) -> u64 {
        self.pos
    }

    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos.min(self.total_bytes);
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.total_bytes.saturating_sub(self.pos);
        let want = (buf.len() as u64).min(remaining);
        if want == 0 {
            return Ok(0);
        }

        let first_sector = self.pos / VBD_SECTOR_BYTES;
        let last_byte = self.pos + want - 1;
        let last_sector = last_byte / VBD_SECTOR_BYTES;
        let sector_count = (last_sector - first_sector + 1) as u32;

        let mut scratch = vec![0u8; sector_count as usize * VBD_SECTOR_BYTES as usize];
        self.vbd
            .read(self.start_lba + first_sector, sector_count, &mut scratch)
            .map_err(|_| VentoyError::NoBootFile)?;

        let offset_in_scratch = (self.pos - first_sector * VBD_SECTOR_BYTES) as usize;
        buf[..want as usize].copy_from_slice(&scratch[offset_in_scratch..offset_in_scratch + want as usize]);
        self.pos += want;
        Ok(want as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FileReplaceRecord, ImgChunk, OsParam};
    use crate::types::{DiskLba, SectorSize};

    struct ZeroDisk;
    impl PhysicalDisk for ZeroDisk {
        fn read_sectors(&self, _lba: DiskLba, _count: u64, out: &mut [u8]) -> std::io::Result<()> {
            out.fill(0);
            Ok(())
        }
    }

    fn chain_with_replace() -> Chain {
        let mut old_file_names: [String; 4] = Default::default();
        old_file_names[0] = "initrd.img".to_string();
        let fr = FileReplaceRecord {
            magic: crate::chain::file_replace::MAGIC,
            old_file_names,
            new_file_virtual_id: 0,
        };
        let mut chain = Chain {
            disk_drive: 0x80,
            disk_sector_size: SectorSize::new(512).unwrap(),
            real_img_size: 10 * 2048,
            virt_img_size: 12 * 2048,
            boot_catalog: 0,
            boot_catalog_sector: [0u8; 512],
            memdisk: false,
            os_param: OsParam::new([0; 16], 0, 0, 0, "/x", 10 * 2048),
            img_chunks: vec![ImgChunk {
                img_start_sector: 0,
                img_end_sector: 9,
                disk_start_sector: 0,
                disk_end_sector: 39,
            }],
            override_chunks: vec![],
            virt_chunks: vec![VirtChunk {
                mem_sector_start: 10,
                mem_sector_end: 12,
                mem_sector_offset: 0,
                remap_sector_start: 0,
                remap_sector_end: 0,
                org_sector_start: 0,
            }],
            file_replace: Some(fr),
            blob: vec![0u8; 0x10000],
        };
        chain.blob[0..4096].fill(0x5A);
        chain
    }

    #[test]
    fn matching_name_is_replaced() {
        let chain = chain_with_replace();
        let disk = ZeroDisk;
        let interceptor = FileOpenInterceptor::new(&chain, &disk);
        match interceptor.open("INITRD.IMG") {
            OpenOutcome::Replaced(mut f) => {
                assert_eq!(f.size(), 4096);
                let mut buf = vec![0u8; 4096];
                assert_eq!(f.read(&mut buf).unwrap(), 4096);
                assert_eq!(buf, vec![0x5Au8; 4096]);
            }
            OpenOutcome::Passthrough => panic!("expected replacement"),
        }
    }

    #[test]
    fn unrelated_name_passes_through() {
        let chain = chain_with_replace();
        let disk = ZeroDisk;
        let interceptor = FileOpenInterceptor::new(&chain, &disk);
        assert!(matches!(interceptor.open("vmlinuz"), OpenOutcome::Passthrough));
    }

    #[test]
    fn wrap_is_idempotent() {
        let chain = chain_with_replace();
        let disk = ZeroDisk;
        let interceptor = FileOpenInterceptor::new(&chain, &disk);
        assert!(interceptor.wrap_open_volume());
        assert!(!interceptor.wrap_open_volume());
    }
}
