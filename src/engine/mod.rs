//! Address-translation engine (C3) — the algorithmic heart. Turns a
//! `(vbd_lba, count)` read into disk reads, override patches, and
//! memory/remap virt-region service.

pub mod run;

use crate::chain::Chain;
use crate::error::VentoyError;
use crate::types::{DiskLba, VBD_SECTOR_BYTES};
use run::Run;

/// Port trait for the underlying physical disk. The engine is unit-testable
/// against any fake implementing this ("a trait behind an extern C shim";
/// this is the trait side, firmware adapters provide the shim).
pub trait PhysicalDisk {
    /// Read `count` native sectors starting at `lba` into `out`.
    /// `out.len()` is exactly `count * disk_sector_size`.
    fn read_sectors(&self, lba: DiskLba, count: u64, out: &mut [u8]) -> std::io::Result<()>;
}

pub struct Engine<'a, D: PhysicalDisk> {
    chain: &'a Chain,
    disk: &'a D,
}

impl<'a, D: PhysicalDisk> Engine<'a, D> {
    pub fn new(chain: &'a Chain, disk: &'a D) -> Self {
        Engine { chain, disk }
    }

    /// Entry point: `vbd_lba`/`count` in 2048-byte VBD sectors.
    /// `out.len() == count as usize * 2048`.
    pub fn read(&self, vbd_lba: u64, count: u32, out: &mut [u8]) -> Result<(), VentoyError> {
        let count = count as u64;
        assert_eq!(out.len() as u64, count * VBD_SECTOR_BYTES);

        let byte_end = (vbd_lba + count) * VBD_SECTOR_BYTES;
        if byte_end > self.chain.virt_img_size {
            return Err(VentoyError::OutOfRange);
        }

        if self.chain.memdisk {
            let start = (vbd_lba * VBD_SECTOR_BYTES) as usize;
            let end = start + out.len();
            out.copy_from_slice(&self.chain.blob[start..end]);
            return Ok(());
        }

        let real_sectors = self.chain.real_img_sectors();
        let image_sectors_here = count.min(real_sectors.saturating_sub(vbd_lba));

        if image_sectors_here > 0 {
            self.read_image_region(
                vbd_lba,
                image_sectors_here,
                &mut out[..(image_sectors_here * VBD_SECTOR_BYTES) as usize],
            )?;
        }

        if image_sectors_here < count {
            let virt_start = vbd_lba + image_sectors_here;
            let virt_count = count - image_sectors_here;
            let virt_out = &mut out[(image_sectors_here * VBD_SECTOR_BYTES) as usize..];
            self.read_virt_region(virt_start, virt_count, virt_out)?;
        }

        Ok(())
    }

    /// Image-region pass: image-chunk reads followed by override
    /// application. `out.len() == count * 2048`; `start`/`count` are image-
    /// relative VBD sectors (`start < real_img_sectors`).
    fn read_image_region(&self, start: u64, count: u64, out: &mut [u8]) -> Result<(), VentoyError> {
        let end = start + count;

        for chunk in &self.chain.img_chunks {
            let lo = start.max(chunk.img_start_sector);
            let hi = end.min(chunk.img_end_sector + 1);
            if lo >= hi {
                continue;
            }
            let vbd_offset_in_chunk = lo - chunk.img_start_sector;
            let native_start = chunk.disk_start_sector
                + self.chain.disk_sector_size.scale_vbd_offset(vbd_offset_in_chunk);
            let native_count = self.chain.disk_sector_size.scale_vbd_offset(hi - lo);

            let out_start = ((lo - start) * VBD_SECTOR_BYTES) as usize;
            let out_len = ((hi - lo) * VBD_SECTOR_BYTES) as usize;
            self.disk
                .read_sectors(DiskLba(native_start), native_count, &mut out[out_start..out_start + out_len])
                .map_err(VentoyError::UnderlyingIo)?;
        }

        let byte_start = start * VBD_SECTOR_BYTES;
        let byte_end = end * VBD_SECTOR_BYTES;
        for ov in &self.chain.override_chunks {
            if let Some((pos, data)) = ov.intersect(byte_start, byte_end) {
                let pos = pos as usize;
                out[pos..pos + data.len()].copy_from_slice(data);
            }
        }

        Ok(())
    }

    /// Virt-region pass: classification and
    /// coalesced dispatch. `start`/`count` are absolute VBD sectors
    /// (`start >= real_img_sectors`).
    fn read_virt_region(&self, start: u64, count: u64, out: &mut [u8]) -> Result<(), VentoyError> {
        let runs = run::classify_runs(&self.chain.virt_chunks, start, count);
        let mut pos = 0usize;
        for r in runs {
            match r {
                Run::Zero { count } => {
                    let len = (count * VBD_SECTOR_BYTES) as usize;
                    out[pos..pos + len].fill(0);
                    pos += len;
                }
                Run::Mem { blob_offset, count } => {
                    let len = (count * VBD_SECTOR_BYTES) as usize;
                    let src = blob_offset as usize;
                    out[pos..pos + len].copy_from_slice(&self.chain.blob[src..src + len]);
                    pos += len;
                }
                Run::Remap { org_start, count } => {
                    let len = (count * VBD_SECTOR_BYTES) as usize;
                    self.read_image_region(org_start, count, &mut out[pos..pos + len])?;
                    pos += len;
                }
            }
        }
        Ok(())
    }
}
