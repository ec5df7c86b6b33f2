//! Chain descriptor codec (C1) — typed views of the binary contract between
//! the host-side preparator and the VBD runtime.

pub mod codec;
pub mod file_replace;
pub mod head;
pub mod img_chunk;
pub mod os_param;
pub mod override_chunk;
pub mod virt_chunk;

pub use file_replace::FileReplaceRecord;
pub use img_chunk::ImgChunk;
pub use os_param::OsParam;
pub use override_chunk::OverrideChunk;
pub use virt_chunk::VirtChunk;

use crate::error::{ChainErrorReason, VentoyError};
use crate::types::SectorSize;

/// The parsed chain: owns the blob bytes that the mem-sector data lives in,
/// plus fully-decoded chunk lists. A real firmware build would keep the
/// chunk lists as zero-copy views into the blob; a hosted library gets the
/// same externally-observable behaviour from owned `Vec`s at a fraction of
/// the lifetime complexity, so that's the choice made here (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct Chain {
    pub disk_drive: u8,
    pub disk_sector_size: SectorSize,
    pub real_img_size: u64,
    pub virt_img_size: u64,
    pub boot_catalog: u32,
    pub boot_catalog_sector: [u8; 512],
    pub memdisk: bool,
    pub os_param: OsParam,
    pub img_chunks: Vec<ImgChunk>,
    pub override_chunks: Vec<OverrideChunk>,
    pub virt_chunks: Vec<VirtChunk>,
    pub file_replace: Option<FileReplaceRecord>,
    pub blob: Vec<u8>,
}

impl Chain {
    pub fn real_img_sectors(&self) -> u64 {
        self.real_img_size / crate::types::VBD_SECTOR_BYTES
    }

    pub fn virt_img_sectors(&self) -> u64 {
        self.virt_img_size / crate::types::VBD_SECTOR_BYTES
    }

    /// Validates invariants I1-I6. Called once by `codec::load`; also
    /// exposed for `Chain::build` so tests and the CLI inspector can check
    /// a hand-assembled chain before serialising it.
    pub fn validate(&self) -> Result<(), VentoyError> {
        self.validate_img_chunks()?;
        self.validate_overrides()?;
        self.validate_virt_chunks()?;
        if !os_param::OsParam::checksum_valid(&self.os_param.to_bytes()) {
            return Err(VentoyError::MalformedChain {
                reason: ChainErrorReason::BadChecksum,
            });
        }
        Ok(())
    }

    fn validate_img_chunks(&self) -> Result<(), VentoyError> {
        let bad = |inv: &'static str| VentoyError::MalformedChain {
            reason: ChainErrorReason::InvariantViolation { invariant: inv },
        };
        let mut expected_next = 0u64;
        for chunk in &self.img_chunks {
            if chunk.img_start_sector != expected_next {
                return Err(bad("I1"));
            }
            if chunk.img_end_sector < chunk.img_start_sector {
                return Err(bad("I1"));
            }
            // I2: byte-length equality between image and disk sides.
            let img_bytes = chunk.img_sector_count() * crate::types::VBD_SECTOR_BYTES;
            let disk_bytes = chunk.disk_sector_count() * self.disk_sector_size.bytes() as u64;
            if img_bytes != disk_bytes {
                return Err(bad("I2"));
            }
            expected_next = chunk.img_end_sector + 1;
        }
        if expected_next != self.real_img_sectors() {
            return Err(bad("I1"));
        }
        Ok(())
    }

    fn validate_overrides(&self) -> Result<(), VentoyError> {
        let bad = |inv: &'static str| VentoyError::MalformedChain {
            reason: ChainErrorReason::InvariantViolation { invariant: inv },
        };
        let mut sorted: Vec<&OverrideChunk> = self.override_chunks.iter().collect();
        sorted.sort_by_key(|o| o.img_offset);
        let mut prev_end = 0u64;
        for (i, o) in sorted.iter().enumerate() {
            if o.byte_range().end > self.real_img_size {
                return Err(bad("I3"));
            }
            if i > 0 && o.img_offset < prev_end {
                return Err(bad("I4"));
            }
            prev_end = o.byte_range().end;
        }
        Ok(())
    }

    fn validate_virt_chunks(&self) -> Result<(), VentoyError> {
        let bad = |inv: &'static str| VentoyError::MalformedChain {
            reason: ChainErrorReason::InvariantViolation { invariant: inv },
        };
        let real_sectors = self.real_img_sectors();
        let virt_sectors = self.virt_img_sectors();
        if virt_sectors < real_sectors {
            return Err(bad("I1"));
        }
        let mut covered = vec![false; (virt_sectors - real_sectors) as usize];
        let mut mark = |s: u64| -> Result<(), VentoyError> {
            if s < real_sectors {
                return Err(bad("I5"));
            }
            let idx = (s - real_sectors) as usize;
            if idx >= covered.len() || covered[idx] {
                return Err(bad("I5"));
            }
            covered[idx] = true;
            Ok(())
        };
        for v in &self.virt_chunks {
            if v.has_mem_window() {
                for s in v.mem_sector_start..v.mem_sector_end {
                    mark(s)?;
                }
            }
            if v.has_remap_window() {
                for s in v.remap_sector_start..v.remap_sector_end {
                    mark(s)?;
                }
            }
        }
        // I6 explicitly allows uncovered sectors (served as zero), so no
        // further check is needed beyond the disjointness already enforced.
        Ok(())
    }
}
