//! Classify-and-coalesce iterator over the virt region: replaces a
//! growable `sector_flag[]` scratch buffer with a single pass that
//! yields maximal contiguous runs.

use crate::chain::VirtChunk;
use crate::types::VBD_SECTOR_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Mem(u64),
    Remap(u64),
    Zero,
}

fn classify_sector(virt_chunks: &[VirtChunk], sector: u64) -> Classification {
    for chunk in virt_chunks {
        if chunk.mem_contains(sector) {
            let offset =
                chunk.mem_sector_offset + (sector - chunk.mem_sector_start) * VBD_SECTOR_BYTES;
            return Classification::Mem(offset);
        }
        if chunk.remap_contains(sector) {
            return Classification::Remap(chunk.remap_origin(sector));
        }
    }
    Classification::Zero
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Run {
    /// `count` VBD sectors served directly from the chain blob, starting at
    /// byte offset `blob_offset`.
    Mem { blob_offset: u64, count: u64 },
    /// `count` VBD sectors that must be served by recursing into the
    /// image-region translation, starting at image-relative sector `org_start`.
    Remap { org_start: u64, count: u64 },
    /// `count` VBD sectors with no covering virt-chunk: read as zero.
    Zero { count: u64 },
}

/// Coalesces the `[start, start+count)` virt-region sector range into the
/// minimal list of `Run`s. Coalescing never crosses a sector whose
/// classification or contiguity differs from the run being built (P5).
pub fn classify_runs(virt_chunks: &[VirtChunk], start: u64, count: u64) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut sector = start;
    let end = start + count;

    while sector < end {
        match classify_sector(virt_chunks, sector) {
            Classification::Zero => {
                let run_start = sector;
                while sector < end && classify_sector(virt_chunks, sector) == Classification::Zero
                {
                    sector += 1;
                }
                runs.push(Run::Zero {
                    count: sector - run_start,
                });
            }
            Classification::Mem(first_offset) => {
                let run_start = sector;
                sector += 1;
                while sector < end {
                    let expected = first_offset + (sector - run_start) * VBD_SECTOR_BYTES;
                    if classify_sector(virt_chunks, sector) == Classification::Mem(expected) {
                        sector += 1;
                    } else {
                        break;
                    }
                }
                runs.push(Run::Mem {
                    blob_offset: first_offset,
                    count: sector - run_start,
                });
            }
            Classification::Remap(first_org) => {
                let run_start = sector;
                sector += 1;
                while sector < end {
                    let expected = first_org + (sector - run_start);
                    if classify_sector(virt_chunks, sector) == Classification::Remap(expected) {
                        sector += 1;
                    } else {
                        break;
                    }
                }
                runs.push(Run::Remap {
                    org_start: first_org,
                    count: sector - run_start,
                });
            }
        }
    }

    runs
}
