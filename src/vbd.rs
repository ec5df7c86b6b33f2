//! Virtual block device (C4) — stateful handle wrapping the translation
//! engine (C3). Read-only: every write path returns `WriteAttempted`.

use crate::chain::Chain;
use crate::engine::{Engine, PhysicalDisk};
use crate::error::{Result, VentoyError};
use crate::types::VBD_SECTOR_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaInfo {
    pub block_size: u32,
    pub last_block: u64,
    pub read_only: bool,
    pub media_present: bool,
}

pub struct VirtualBlockDevice<'a, D: PhysicalDisk> {
    chain: &'a Chain,
    disk: &'a D,
}

impl<'a, D: PhysicalDisk> VirtualBlockDevice<'a, D> {
    pub fn new(chain: &'a Chain, disk: &'a D) -> Self {
        VirtualBlockDevice { chain, disk }
    }

    /// No-op success — the VBD carries no device state that
    /// a reset could meaningfully clear.
    pub fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn read(&self, lba: u64, count: u32, buf: &mut [u8]) -> Result<()> {
        Engine::new(self.chain, self.disk).read(lba, count, buf)
    }

    pub fn write(&mut self, _lba: u64, _count: u32, _buf: &[u8]) -> Result<()> {
        log::warn!("write attempted on read-only VBD");
        Err(VentoyError::WriteAttempted)
    }

    /// Always succeeds: there is nothing buffered to flush on a read-only
    /// device backed directly by synchronous firmware I/O.
    pub fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            block_size: VBD_SECTOR_BYTES as u32,
            last_block: self.chain.virt_img_sectors().saturating_sub(1),
            read_only: true,
            media_present: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ImgChunk, OsParam};
    use crate::types::{DiskLba, SectorSize};

    struct ZeroDisk;
    impl PhysicalDisk for ZeroDisk {
        fn read_sectors(&self, _lba: DiskLba, _count: u64, out: &mut [u8]) -> std::io::Result<()> {
            out.fill(0);
            Ok(())
        }
    }

    fn tiny_chain() -> Chain {
        Chain {
            disk_drive: 0x80,
            disk_sector_size: SectorSize::new(512).unwrap(),
            real_img_size: 4 * 2048,
            virt_img_size: 4 * 2048,
            boot_catalog: 0,
            boot_catalog_sector: [0u8; 512],
            memdisk: false,
            os_param: OsParam::new([0; 16], 0, 0, 0, "/x", 4 * 2048),
            img_chunks: vec![ImgChunk {
                img_start_sector: 0,
                img_end_sector: 3,
                disk_start_sector: 0,
                disk_end_sector: 15,
            }],
            override_chunks: vec![],
            virt_chunks: vec![],
            file_replace: None,
            blob: vec![],
        }
    }

    #[test]
    fn write_is_always_rejected_and_state_unchanged() {
        let chain = tiny_chain();
        let disk = ZeroDisk;
        let mut vbd = VirtualBlockDevice::new(&chain, &disk);

        let mut before = vec![0u8; 2048];
        vbd.read(0, 1, &mut before).unwrap();

        let patch = vec![0xFFu8; 2048];
        assert!(matches!(vbd.write(0, 1, &patch), Err(VentoyError::WriteAttempted)));

        let mut after = vec![0u8; 2048];
        vbd.read(0, 1, &mut after).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn flush_always_succeeds() {
        let chain = tiny_chain();
        let disk = ZeroDisk;
        let mut vbd = VirtualBlockDevice::new(&chain, &disk);
        assert!(vbd.flush().is_ok());
    }

    #[test]
    fn media_info_reports_read_only_cdfs_geometry() {
        let chain = tiny_chain();
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let info = vbd.media_info();
        assert_eq!(info.block_size, 2048);
        assert_eq!(info.last_block, 3);
        assert!(info.read_only);
        assert!(info.media_present);
    }

    #[test]
    fn coverage_every_sector_reads_successfully() {
        let chain = tiny_chain();
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        for lba in 0..chain.virt_img_sectors() {
            let mut buf = vec![0u8; 2048];
            assert!(vbd.read(lba, 1, &mut buf).is_ok());
        }
    }
}
