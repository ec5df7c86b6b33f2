//! FAT/exFAT reference extent walker. Rather than re-implementing the FAT
//! cluster-chain walk, this drives the real `fatfs` crate against a
//! recording storage backend and reconstructs the extent list from the
//! byte ranges `fatfs` actually reads while streaming the file — the same
//! "instrument the seeks" approach used to validate storage adapters
//! without a second parallel implementation of the on-disk format.
//!
//! `fatfs` also reads the BPB, the FAT table, and directory sectors while
//! opening a path, on the same storage handle. Those reads are dropped
//! before the file's own data reads start (see [`TracingStorage::drain_reads`]),
//! and any read that still lands before the computed data-region offset
//! is treated as fragmentation this mapper refuses rather than folding
//! into the byte stream (see [`first_data_region_offset`]).

use super::{coalesce, Extent, ExtentMapper};
use crate::error::ChunkErr;
use std::cell::RefCell;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;

const SECTOR_SIZE: u64 = 2048;

struct StorageState<'a> {
    cursor: Cursor<&'a [u8]>,
    reads: Vec<(u64, usize)>,
}

/// Cheap handle onto a shared [`StorageState`]. Cloning it (to keep one
/// handle outside the `fatfs::FileSystem` that owns the other) is how this
/// recovers the recorded reads after the filesystem is done with them,
/// without needing a storage-eject API from `fatfs` itself.
#[derive(Clone)]
struct TracingStorage<'a> {
    shared: Rc<RefCell<StorageState<'a>>>,
}

impl<'a> TracingStorage<'a> {
    fn new(data: &'a [u8]) -> Self {
        TracingStorage {
            shared: Rc::new(RefCell::new(StorageState {
                cursor: Cursor::new(data),
                reads: Vec::new(),
            })),
        }
    }

    /// Returns every `(offset, len)` recorded since the last drain and
    /// clears the log. Takes `&self`, not `self`, so it can be called
    /// partway through a `fatfs` call chain to discard bookkeeping reads
    /// (BPB, FAT table, directory sectors) before the reads that matter
    /// (the target file's own data) are recorded.
    fn drain_reads(&self) -> Vec<(u64, usize)> {
        std::mem::take(&mut self.shared.borrow_mut().reads)
    }
}

impl<'a> Read for TracingStorage<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.borrow_mut();
        let pos = state.cursor.position();
        let n = state.cursor.read(buf)?;
        if n > 0 {
            state.reads.push((pos, n));
        }
        Ok(n)
    }
}

impl<'a> Write for TracingStorage<'a> {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only extent mapper"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> Seek for TracingStorage<'a> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.shared.borrow_mut().cursor.seek(pos)
    }
}

/// Maps files inside a FAT volume whose backing bytes (the partition, not
/// the whole disk) are held in `volume` and which sits at `partition_start_lba`
/// native sectors on the physical disk.
pub struct FatMapper<'a> {
    volume: &'a [u8],
    partition_start_lba: u64,
    native_sector_size: u64,
}

impl<'a> FatMapper<'a> {
    pub fn new(volume: &'a [u8], partition_start_lba: u64, native_sector_size: u64) -> Self {
        FatMapper {
            volume,
            partition_start_lba,
            native_sector_size,
        }
    }

    fn disk_lba_for(&self, volume_byte_offset: u64) -> Result<u64, ChunkErr> {
        if volume_byte_offset % self.native_sector_size != 0 {
            return Err(ChunkErr::Sparse);
        }
        Ok(self.partition_start_lba + volume_byte_offset / self.native_sector_size)
    }
}

fn bpb_u16(bpb: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bpb[offset], bpb[offset + 1]])
}

fn bpb_u32(bpb: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bpb[offset], bpb[offset + 1], bpb[offset + 2], bpb[offset + 3]])
}

/// Byte offset, from the start of the volume, where the data region
/// begins — past the reserved sectors, the FAT tables, and (FAT12/16
/// only) the fixed-size root directory. Reads below this offset are BPB,
/// FAT-table, or root-directory bookkeeping and never file content, so
/// `extents()` uses this as a sanity filter independent of `fatfs`'s own
/// read order.
fn first_data_region_offset(volume: &[u8]) -> Result<u64, ChunkErr> {
    if volume.len() < 512 {
        return Err(ChunkErr::Fragmented(0));
    }
    let bytes_per_sector = bpb_u16(volume, 11) as u64;
    if bytes_per_sector == 0 {
        return Err(ChunkErr::Fragmented(0));
    }
    let reserved_sectors = bpb_u16(volume, 14) as u64;
    let num_fats = volume[16] as u64;
    let root_entry_count = bpb_u16(volume, 17) as u64;
    let sectors_per_fat_16 = bpb_u16(volume, 22) as u64;
    let sectors_per_fat = if sectors_per_fat_16 != 0 {
        sectors_per_fat_16
    } else {
        bpb_u32(volume, 36) as u64
    };
    let root_dir_sectors = (root_entry_count * 32 + bytes_per_sector - 1) / bytes_per_sector;
    let first_data_sector = reserved_sectors + num_fats * sectors_per_fat + root_dir_sectors;
    Ok(first_data_sector * bytes_per_sector)
}

impl<'a> ExtentMapper for FatMapper<'a> {
    fn extents(&self, path: &str) -> Result<Vec<Extent>, ChunkErr> {
        let data_region_offset = first_data_region_offset(self.volume)?;

        let storage = TracingStorage::new(self.volume);
        let tap = storage.clone();
        let fs = fatfs::FileSystem::new(storage, fatfs::FsOptions::new())
            .map_err(|_| ChunkErr::Fragmented(0))?;
        let calls = {
            let root = fs.root_dir();
            let mut file = root.open_file(path).map_err(|_| ChunkErr::Fragmented(0))?;
            // Discard everything `FileSystem::new` and `open_file` read
            // while parsing the BPB and walking directories to find this
            // file — only the reads `read_to_end` itself issues are the
            // file's actual data.
            tap.drain_reads();
            let mut sink = Vec::new();
            file.read_to_end(&mut sink).map_err(|_| ChunkErr::Fragmented(0))?;
            tap.drain_reads()
        };
        drop(fs);

        let mut extents = Vec::with_capacity(calls.len());
        let mut file_byte_off = 0u64;
        for (disk_off, len) in calls {
            // A cluster-chain lookup mid-stream would show up as a read
            // back in the FAT/root-dir region; treat that the same as any
            // other fragmentation this mapper can't represent as a single
            // run, rather than silently mixing it into the byte stream.
            if disk_off < data_region_offset {
                return Err(ChunkErr::Fragmented(extents.len() + 1));
            }
            if len as u64 % self.native_sector_size != 0 || file_byte_off % SECTOR_SIZE != 0 {
                return Err(ChunkErr::Fragmented(extents.len() + 1));
            }
            let disk_lba = self.disk_lba_for(disk_off)?;
            let file_off_sectors = file_byte_off / SECTOR_SIZE;
            let len_sectors = (len as u64 + SECTOR_SIZE - 1) / SECTOR_SIZE;
            extents.push((file_off_sectors, disk_lba, len_sectors));
            file_byte_off += len as u64;
        }

        Ok(coalesce(extents))
    }
}
