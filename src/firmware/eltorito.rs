//! El-Torito boot-catalog surfacing and the isolinux `boot_info` table
//! patch quirk, following the boot-record-volume-descriptor layout and
//! validation/section-entry byte patterns used by Ventoy's GRUB2 module.

pub const VOLUME_DESCRIPTOR_SECTOR: u64 = 17;
pub const SECTOR_SIZE: usize = 2048;

/// El-Torito Boot Record Volume Descriptor (one 2048-byte sector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRecordVolumeDescriptor {
    pub sector_type: u8,
    pub version: u8,
    pub boot_catalog_sector: u32,
}

impl BootRecordVolumeDescriptor {
    /// Parses a raw sector; returns `None` if it isn't a valid El-Torito
    /// boot record (type 0, id "CD001", version 1, system id
    /// "EL TORITO SPECIFICATION").
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Option<Self> {
        let sector_type = sector[0];
        let id = &sector[1..6];
        let version = sector[6];
        let system_id = &sector[7..39];

        if sector_type != 0 || version != 1 {
            return None;
        }
        if id != b"CD001" {
            return None;
        }
        if &system_id[..23] != b"EL TORITO SPECIFICATION" {
            return None;
        }

        let boot_catalog_sector = u32::from_le_bytes(sector[71..75].try_into().unwrap());
        Some(BootRecordVolumeDescriptor {
            sector_type,
            version,
            boot_catalog_sector,
        })
    }
}

pub const PLATFORM_X86: u8 = 0;
pub const PLATFORM_EFI: u8 = 0xEF;

/// Scans a 512-byte boot-catalog sector for an EFI entry, either in the
/// Validation Entry (bytes 0-1 == `01 EF`) or in a Section Header Entry
/// (bytes `i`/`i+1` == `90|91 EF`, checked every 32 bytes starting at 64,
/// matching the header-entry stride of the catalog format).
pub fn has_efi_entry(catalog_sector: &[u8; 512]) -> bool {
    if catalog_sector[0] == 0x01 && catalog_sector[1] == PLATFORM_EFI {
        return true;
    }
    let mut i = 64;
    while i + 1 < catalog_sector.len() {
        if (catalog_sector[i] == 0x90 || catalog_sector[i] == 0x91)
            && catalog_sector[i + 1] == PLATFORM_EFI
        {
            return true;
        }
        i += 32;
    }
    false
}

/// isolinux's "boot info table", written into the first bytes of the boot
/// file itself (not the catalog) at a fixed offset. Field layout matches
/// isolinux's own `boot_info_table` struct.
pub const BOOT_INFO_TABLE_OFFSET: usize = 8;
pub const BOOT_INFO_TABLE_SIZE: usize = 56;

/// The empirical clamp threshold: catalogs observed in
/// the wild sometimes report a `boot.length` greater than 256 which is
/// known-bad; such values are patched down to 4. The threshold itself is
/// not derived from anything else and must not be "simplified".
pub const BAD_LENGTH_THRESHOLD: u32 = 256;
pub const PATCHED_LENGTH: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootInfoTable {
    pub pvd_lba: u32,
    pub boot_file_location: u32,
    pub boot_file_length: u32,
    pub checksum: u32,
}

impl BootInfoTable {
    pub fn parse(boot_file: &[u8]) -> Option<Self> {
        if boot_file.len() < BOOT_INFO_TABLE_OFFSET + 16 {
            return None;
        }
        let f = |off: usize| {
            u32::from_le_bytes(
                boot_file[BOOT_INFO_TABLE_OFFSET + off..BOOT_INFO_TABLE_OFFSET + off + 4]
                    .try_into()
                    .unwrap(),
            )
        };
        Some(BootInfoTable {
            pvd_lba: f(0),
            boot_file_location: f(4),
            boot_file_length: f(8),
            checksum: f(12),
        })
    }

    /// Applies the isolinux quirk workaround in place: if
    /// `boot_file_location == 0` but the catalog gives a non-zero start
    /// LBA, patch it in; if `boot_file_length` exceeds the bad-catalog
    /// threshold, clamp it to the empirical safe constant.
    pub fn patch(boot_file: &mut [u8], catalog_start_lba: u32) {
        let Some(mut table) = Self::parse(boot_file) else {
            return;
        };
        let mut changed = false;
        if table.boot_file_location == 0 && catalog_start_lba != 0 {
            table.boot_file_location = catalog_start_lba;
            changed = true;
        }
        if table.boot_file_length > BAD_LENGTH_THRESHOLD {
            table.boot_file_length = PATCHED_LENGTH;
            changed = true;
        }
        if !changed {
            return;
        }
        let base = BOOT_INFO_TABLE_OFFSET;
        boot_file[base..base + 4].copy_from_slice(&table.pvd_lba.to_le_bytes());
        boot_file[base + 4..base + 8].copy_from_slice(&table.boot_file_location.to_le_bytes());
        boot_file[base + 8..base + 12].copy_from_slice(&table.boot_file_length.to_le_bytes());
        boot_file[base + 12..base + 16].copy_from_slice(&table.checksum.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_descriptor_sector(catalog_sector: u32) -> [u8; SECTOR_SIZE] {
        let mut s = [0u8; SECTOR_SIZE];
        s[0] = 0;
        s[1..6].copy_from_slice(b"CD001");
        s[6] = 1;
        s[7..30].copy_from_slice(b"EL TORITO SPECIFICATION");
        s[71..75].copy_from_slice(&catalog_sector.to_le_bytes());
        s
    }

    #[test]
    fn parses_valid_boot_record() {
        let s = volume_descriptor_sector(42);
        let desc = BootRecordVolumeDescriptor::parse(&s).unwrap();
        assert_eq!(desc.boot_catalog_sector, 42);
    }

    #[test]
    fn rejects_wrong_id() {
        let mut s = volume_descriptor_sector(1);
        s[1] = b'X';
        assert!(BootRecordVolumeDescriptor::parse(&s).is_none());
    }

    #[test]
    fn detects_efi_in_validation_entry() {
        let mut s = [0u8; 512];
        s[0] = 0x01;
        s[1] = PLATFORM_EFI;
        assert!(has_efi_entry(&s));
    }

    #[test]
    fn detects_efi_in_section_header_entry() {
        let mut s = [0u8; 512];
        s[0] = 0x01;
        s[1] = PLATFORM_X86;
        s[64] = 0x91;
        s[65] = PLATFORM_EFI;
        assert!(has_efi_entry(&s));
    }

    #[test]
    fn no_efi_entry_found() {
        let s = [0u8; 512];
        assert!(!has_efi_entry(&s));
    }

    fn boot_file_with_table(location: u32, length: u32) -> Vec<u8> {
        let mut f = vec![0u8; 128];
        f[8..12].copy_from_slice(&1u32.to_le_bytes());
        f[12..16].copy_from_slice(&location.to_le_bytes());
        f[16..20].copy_from_slice(&length.to_le_bytes());
        f[20..24].copy_from_slice(&0u32.to_le_bytes());
        f
    }

    #[test]
    fn patches_zero_boot_file_location() {
        let mut f = boot_file_with_table(0, 10);
        BootInfoTable::patch(&mut f, 555);
        let table = BootInfoTable::parse(&f).unwrap();
        assert_eq!(table.boot_file_location, 555);
    }

    #[test]
    fn leaves_nonzero_boot_file_location_alone() {
        let mut f = boot_file_with_table(123, 10);
        BootInfoTable::patch(&mut f, 555);
        let table = BootInfoTable::parse(&f).unwrap();
        assert_eq!(table.boot_file_location, 123);
    }

    #[test]
    fn clamps_bad_catalog_length() {
        let mut f = boot_file_with_table(123, 9999);
        BootInfoTable::patch(&mut f, 0);
        let table = BootInfoTable::parse(&f).unwrap();
        assert_eq!(table.boot_file_length, PATCHED_LENGTH);
    }

    #[test]
    fn leaves_reasonable_length_alone() {
        let mut f = boot_file_with_table(123, 100);
        BootInfoTable::patch(&mut f, 0);
        let table = BootInfoTable::parse(&f).unwrap();
        assert_eq!(table.boot_file_length, 100);
    }
}
