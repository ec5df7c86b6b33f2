//! BIOS INT 13h adapter (C5 leaf). Hosted equivalent of the real-mode
//! interrupt vector: one method per function code,
//! operating on a [`VirtualBlockDevice`] instead of register state, since
//! this crate models the firmware callback contract rather than an x86 CPU.

use crate::engine::PhysicalDisk;
use crate::geometry::Geometry;
use crate::vbd::VirtualBlockDevice;
use std::cell::Cell;

pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_INVALID: u8 = 0x01;
pub const STATUS_WRITE_PROTECTED: u8 = 0x03;
pub const STATUS_SECTOR_NOT_FOUND: u8 = 0x04;
pub const STATUS_DRIVE_NOT_READY: u8 = 0xAA;

pub type Int13Result = Result<(), u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveParameters {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors_per_track: u32,
    pub total_sectors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionsInfo {
    pub major_version: u8,
    /// Bit 0: extended disk access, bit 2: enhanced disk drive support.
    pub support_bitmap: u16,
}

/// Extended "Disk Address Packet" as built by INT 13h AH=42h/43h callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskAddressPacket {
    pub block_count: u16,
    pub lba: u64,
}

pub struct BiosAdapter<'a, D: PhysicalDisk> {
    vbd: VirtualBlockDevice<'a, D>,
    geometry: Geometry,
    boot_catalog_sector: [u8; 512],
    last_status: Cell<u8>,
}

impl<'a, D: PhysicalDisk> BiosAdapter<'a, D> {
    pub fn new(
        vbd: VirtualBlockDevice<'a, D>,
        total_native_sectors: u64,
        boot_catalog_sector: [u8; 512],
    ) -> Self {
        BiosAdapter {
            vbd,
            geometry: Geometry::synthesize(total_native_sectors),
            boot_catalog_sector,
            last_status: Cell::new(STATUS_SUCCESS),
        }
    }

    fn fail(&self, status: u8) -> Int13Result {
        self.last_status.set(status);
        Err(status)
    }

    fn ok(&self) -> Int13Result {
        self.last_status.set(STATUS_SUCCESS);
        Ok(())
    }

    /// AH=00h: reset disk system.
    pub fn reset(&self) -> Int13Result {
        self.ok()
    }

    /// AH=01h: get status of last operation.
    pub fn last_status(&self) -> u8 {
        self.last_status.get()
    }

    /// AH=02h: CHS read.
    pub fn read_chs(
        &self,
        cylinder: u32,
        head: u32,
        sector: u32,
        count: u32,
        out: &mut [u8],
    ) -> Int13Result {
        let lba = match self.geometry.chs_to_lba(cylinder, head, sector) {
            Some(lba) => lba,
            None => return self.fail(STATUS_INVALID),
        };
        self.read_lba(lba, count, out)
    }

    /// AH=03h: CHS write — always write-protected.
    pub fn write_chs(&self, _cylinder: u32, _head: u32, _sector: u32, _count: u32) -> Int13Result {
        self.fail(STATUS_WRITE_PROTECTED)
    }

    /// AH=08h: get drive parameters.
    pub fn get_drive_parameters(&self) -> DriveParameters {
        self.last_status.set(STATUS_SUCCESS);
        DriveParameters {
            cylinders: self.geometry.cylinders,
            heads: self.geometry.heads,
            sectors_per_track: self.geometry.sectors_per_track,
            total_sectors: self.geometry.total_sectors(),
        }
    }

    /// AH=15h: get disk type. The VBD always reports itself as a fixed
    /// disk with a present, non-removable medium.
    pub fn disk_type(&self) -> u8 {
        const DISK_TYPE_FIXED: u8 = 0x03;
        DISK_TYPE_FIXED
    }

    /// AH=41h: extensions check. Callers pass the `0x55AA` signature in BX;
    /// a mismatched signature means "extensions not supported" by
    /// convention, so it is not itself a failure of this call.
    pub fn extensions_check(&self, signature: u16) -> Option<ExtensionsInfo> {
        if signature != 0x55AA {
            return None;
        }
        Some(ExtensionsInfo {
            major_version: 0x21,
            support_bitmap: 0b001,
        })
    }

    /// AH=42h: extended read.
    pub fn extended_read(&self, dap: DiskAddressPacket, out: &mut [u8]) -> Int13Result {
        self.read_lba(dap.lba, dap.block_count as u32, out)
    }

    /// AH=43h: extended write — always write-protected.
    pub fn extended_write(&self, _dap: DiskAddressPacket) -> Int13Result {
        self.fail(STATUS_WRITE_PROTECTED)
    }

    /// AH=44h: verify sectors (seek semantics). Only range-checks; there is
    /// no physical seek to perform against a VBD.
    pub fn verify(&self, lba: u64, count: u32) -> Int13Result {
        if !self.lba_range_valid(lba, count) {
            return self.fail(STATUS_SECTOR_NOT_FOUND);
        }
        self.ok()
    }

    /// AH=48h: get extended drive parameters.
    pub fn extended_parameters(&self) -> DriveParameters {
        self.get_drive_parameters()
    }

    /// AH=4Bh: El-Torito terminate/get-status. Returns the cached catalog
    /// sector the way the runtime already holds it (ChainHead.boot_catalog_sector).
    pub fn eltorito_status(&self) -> [u8; 512] {
        self.boot_catalog_sector
    }

    /// AH=4Dh: read El-Torito boot catalog.
    pub fn read_boot_catalog(&self, out: &mut [u8; 512]) {
        out.copy_from_slice(&self.boot_catalog_sector);
        self.last_status.set(STATUS_SUCCESS);
    }

    /// `lba`/`count` here are both in the VBD's own 2048-byte sectors; the
    /// caller-facing CHS/LBA values from a real INT 13h request would
    /// additionally need the disk_sector_size conversion C3 already applies
    /// internally, so the adapter just forwards straight through to
    /// `VirtualBlockDevice::read`.
    ///
    /// Range-checked against the VBD's own geometry (`virt_img_sectors`),
    /// not `self.geometry`: `Geometry` is synthesised from *native* disk
    /// sectors and truncated to whole cylinders, so for any disk smaller
    /// than one cylinder it reports zero cylinders and would reject every
    /// LBA. `Geometry` stays scoped to CHS<->LBA translation and the
    /// AH=08h/48h parameter answers.
    fn read_lba(&self, lba: u64, count: u32, out: &mut [u8]) -> Int13Result {
        if !self.lba_range_valid(lba, count) {
            return self.fail(STATUS_SECTOR_NOT_FOUND);
        }
        match self.vbd.read(lba, count, out) {
            Ok(()) => self.ok(),
            Err(_) => self.fail(STATUS_DRIVE_NOT_READY),
        }
    }

    fn lba_range_valid(&self, lba: u64, count: u32) -> bool {
        if count == 0 {
            return true;
        }
        let last_block = self.vbd.media_info().last_block;
        match lba.checked_add(count as u64 - 1) {
            Some(last) => last <= last_block,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, ImgChunk, OsParam};
    use crate::types::{DiskLba, SectorSize};

    struct ZeroDisk;
    impl PhysicalDisk for ZeroDisk {
        fn read_sectors(&self, _lba: DiskLba, _count: u64, out: &mut [u8]) -> std::io::Result<()> {
            out.fill(0x42);
            Ok(())
        }
    }

    fn chain(sectors: u64) -> Chain {
        Chain {
            disk_drive: 0x80,
            disk_sector_size: SectorSize::new(512).unwrap(),
            real_img_size: sectors * 2048,
            virt_img_size: sectors * 2048,
            boot_catalog: 0,
            boot_catalog_sector: [0u8; 512],
            memdisk: false,
            os_param: OsParam::new([0; 16], 0, 0, 0, "/x", sectors * 2048),
            img_chunks: vec![ImgChunk {
                img_start_sector: 0,
                img_end_sector: sectors - 1,
                disk_start_sector: 0,
                disk_end_sector: sectors * 4 - 1,
            }],
            override_chunks: vec![],
            virt_chunks: vec![],
            file_replace: None,
            blob: vec![],
        }
    }

    #[test]
    fn writes_are_always_write_protected() {
        let chain = chain(100);
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let adapter = BiosAdapter::new(vbd, 100 * 4, [0u8; 512]);
        assert_eq!(adapter.write_chs(0, 0, 1, 1), Err(STATUS_WRITE_PROTECTED));
        assert_eq!(
            adapter.extended_write(DiskAddressPacket { block_count: 1, lba: 0 }),
            Err(STATUS_WRITE_PROTECTED)
        );
    }

    #[test]
    fn extensions_check_requires_signature() {
        let chain = chain(100);
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let adapter = BiosAdapter::new(vbd, 400, [0u8; 512]);
        assert!(adapter.extensions_check(0x1234).is_none());
        assert!(adapter.extensions_check(0x55AA).is_some());
    }

    #[test]
    fn out_of_geometry_read_fails_invalid() {
        let chain = chain(10);
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let adapter = BiosAdapter::new(vbd, 40, [0u8; 512]);
        let mut buf = vec![0u8; 2048];
        // Cylinder far beyond the synthesized geometry for a 40-sector disk.
        assert_eq!(adapter.read_chs(0, 255, 64, 1, &mut buf), Err(STATUS_INVALID));
    }

    #[test]
    fn extended_read_round_trips_through_vbd() {
        let chain = chain(10);
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let adapter = BiosAdapter::new(vbd, 40, [0u8; 512]);
        let mut buf = vec![0u8; 2048];
        let dap = DiskAddressPacket { block_count: 1, lba: 0 };
        assert!(adapter.extended_read(dap, &mut buf).is_ok());
        assert_eq!(buf, vec![0x42u8; 2048]);
        assert_eq!(adapter.last_status(), STATUS_SUCCESS);
    }

    #[test]
    fn read_boot_catalog_returns_cached_sector() {
        let chain = chain(10);
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let mut cached = [0u8; 512];
        cached[0] = 7;
        let adapter = BiosAdapter::new(vbd, 40, cached);
        let mut out = [0u8; 512];
        adapter.read_boot_catalog(&mut out);
        assert_eq!(out[0], 7);
    }
}
