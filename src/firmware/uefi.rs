//! UEFI adapter leaf (C5). `EFI_BLOCK_IO_PROTOCOL` is a vtable of function
//! pointers in the real firmware; here that becomes a trait, with only a
//! thin shim (outside this crate, in whatever embeds it as a UEFI driver)
//! translating to the actual C ABI.

use crate::engine::PhysicalDisk;
use crate::error::VentoyError;
use crate::vbd::{MediaInfo, VirtualBlockDevice};

/// Mirrors the handful of `EFI_STATUS` codes this adapter can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfiStatus {
    Success,
    WriteProtected,
    InvalidParameter,
    DeviceError,
    NotFound,
}

impl From<VentoyError> for EfiStatus {
    fn from(e: VentoyError) -> Self {
        match e {
            VentoyError::WriteAttempted => EfiStatus::WriteProtected,
            VentoyError::OutOfRange => EfiStatus::InvalidParameter,
            VentoyError::NoBootFile => EfiStatus::NotFound,
            _ => EfiStatus::DeviceError,
        }
    }
}

pub trait BlockIoProtocol {
    fn reset(&mut self) -> Result<(), EfiStatus>;
    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> Result<(), EfiStatus>;
    fn write_blocks(&mut self, lba: u64, buf: &[u8]) -> Result<(), EfiStatus>;
    fn flush_blocks(&mut self) -> Result<(), EfiStatus>;
    fn media(&self) -> MediaInfo;
}

pub struct UefiBlockIoAdapter<'a, D: PhysicalDisk> {
    vbd: VirtualBlockDevice<'a, D>,
}

impl<'a, D: PhysicalDisk> UefiBlockIoAdapter<'a, D> {
    pub fn new(vbd: VirtualBlockDevice<'a, D>) -> Self {
        UefiBlockIoAdapter { vbd }
    }
}

impl<'a, D: PhysicalDisk> BlockIoProtocol for UefiBlockIoAdapter<'a, D> {
    fn reset(&mut self) -> Result<(), EfiStatus> {
        self.vbd.reset().map_err(EfiStatus::from)
    }

    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> Result<(), EfiStatus> {
        let block_size = self.vbd.media_info().block_size as usize;
        if buf.len() % block_size != 0 {
            return Err(EfiStatus::InvalidParameter);
        }
        let count = (buf.len() / block_size) as u32;
        self.vbd.read(lba, count, buf).map_err(EfiStatus::from)
    }

    fn write_blocks(&mut self, lba: u64, buf: &[u8]) -> Result<(), EfiStatus> {
        let block_size = self.vbd.media_info().block_size as usize;
        let count = (buf.len() / block_size) as u32;
        self.vbd
            .write(lba, count, buf)
            .map_err(EfiStatus::from)
    }

    fn flush_blocks(&mut self) -> Result<(), EfiStatus> {
        self.vbd.flush().map_err(EfiStatus::from)
    }

    fn media(&self) -> MediaInfo {
        self.vbd.media_info()
    }
}

/// Vendor GUID Ventoy's surfaced disk is installed under, and the
/// `VTOYBLK`-style name carried in its device path node so it can be
/// re-located by the guest after `ExitBootServices`.
pub const VENTOY_VENDOR_GUID: [u8; 16] = [
    0x77, 0x77, 0x2f, 0x9b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
pub const DEVICE_PATH_NAME: &str = "VTOYBLK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VentoyDevicePath {
    pub vendor_guid: [u8; 16],
    pub name: &'static str,
}

pub fn device_path() -> VentoyDevicePath {
    VentoyDevicePath {
        vendor_guid: VENTOY_VENDOR_GUID,
        name: DEVICE_PATH_NAME,
    }
}

/// Whether "memdisk" mode (chain-level flag) should additionally install a
/// RamDisk protocol instance under the virtual-CD GUID.
pub fn wants_ramdisk_protocol(memdisk: bool) -> bool {
    memdisk
}

/// Policy for the guest-loader retry: after
/// `StartImage` reports `EFI_NOT_FOUND` on the first attempt, the bundled
/// iso9660 EFI driver may be loaded from the original filesystem and the
/// attempt retried exactly once.
pub fn should_retry_with_iso9660_driver(first_attempt: Result<(), EfiStatus>, already_retried: bool) -> bool {
    matches!(first_attempt, Err(EfiStatus::NotFound)) && !already_retried
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Chain, ImgChunk, OsParam};
    use crate::types::{DiskLba, SectorSize};

    struct ZeroDisk;
    impl PhysicalDisk for ZeroDisk {
        fn read_sectors(&self, _lba: DiskLba, _count: u64, out: &mut [u8]) -> std::io::Result<()> {
            out.fill(0);
            Ok(())
        }
    }

    fn chain() -> Chain {
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
    fn write_blocks_maps_to_write_protected() {
        let chain = chain();
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let mut adapter = UefiBlockIoAdapter::new(vbd);
        let buf = vec![0u8; 2048];
        assert_eq!(adapter.write_blocks(0, &buf), Err(EfiStatus::WriteProtected));
    }

    #[test]
    fn read_blocks_rejects_unaligned_buffer() {
        let chain = chain();
        let disk = ZeroDisk;
        let vbd = VirtualBlockDevice::new(&chain, &disk);
        let adapter = UefiBlockIoAdapter::new(vbd);
        let mut buf = vec![0u8; 100];
        assert_eq!(adapter.read_blocks(0, &mut buf), Err(EfiStatus::InvalidParameter));
    }

    #[test]
    fn retry_policy_only_fires_once_on_not_found() {
        assert!(should_retry_with_iso9660_driver(Err(EfiStatus::NotFound), false));
        assert!(!should_retry_with_iso9660_driver(Err(EfiStatus::NotFound), true));
        assert!(!should_retry_with_iso9660_driver(Ok(()), false));
    }
}
