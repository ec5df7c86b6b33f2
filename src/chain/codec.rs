//! Binary load/serialise for the chain blob. `load` is the only entry point
//! firmware-side code uses; `serialize` exists for `Chain::build`-style
//! round-tripping in tests and in the `ventoyctl` inspector.

use super::file_replace::{FileReplaceRecord, MAX_OLD_NAMES, NAME_MAX};
use super::head;
use super::os_param::{self, OsParam};
use super::{Chain, ImgChunk, OverrideChunk, VirtChunk};
use crate::error::{ChainErrorReason, VentoyError};
use crate::types::SectorSize;

pub fn load(bytes: &[u8]) -> Result<Chain, VentoyError> {
    let bad = |reason: ChainErrorReason| VentoyError::MalformedChain { reason };

    if bytes.len() < head::HEADER_SIZE {
        return Err(bad(ChainErrorReason::OutOfBounds { field: "header" }));
    }
    if bytes[head::MAGIC_OFFSET..head::MAGIC_OFFSET + 16] != head::MAGIC {
        return Err(bad(ChainErrorReason::BadMagic));
    }

    let u32_at = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    let u64_at = |off: usize| u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());

    let disk_drive = bytes[head::DISK_DRIVE_OFFSET];
    let disk_sector_size = SectorSize::new(u32_at(head::SECTOR_SIZE_OFFSET)).ok_or_else(|| {
        bad(ChainErrorReason::OutOfBounds {
            field: "disk_sector_size",
        })
    })?;
    let real_img_size = u64_at(head::REAL_IMG_SIZE_OFFSET);
    let virt_img_size = u64_at(head::VIRT_IMG_SIZE_OFFSET);
    let boot_catalog = u32_at(head::BOOT_CATALOG_OFFSET);
    let flags = u32_at(head::FLAGS_OFFSET);
    let memdisk = flags & head::FLAG_MEMDISK != 0;

    let mut boot_catalog_sector = [0u8; 512];
    boot_catalog_sector.copy_from_slice(
        &bytes[head::BOOT_CATALOG_SECTOR_OFFSET
            ..head::BOOT_CATALOG_SECTOR_OFFSET + head::BOOT_CATALOG_SECTOR_LEN],
    );

    let mut os_param_bytes = [0u8; os_param::WIRE_SIZE];
    os_param_bytes.copy_from_slice(&bytes[head::OS_PARAM_OFFSET..head::OS_PARAM_OFFSET + os_param::WIRE_SIZE]);
    let param = OsParam::from_bytes(&os_param_bytes)
        .ok_or_else(|| bad(ChainErrorReason::BadChecksum))?;

    let img_chunk_offset = u32_at(head::IMG_CHUNK_OFFSET_OFFSET) as usize;
    let img_chunk_num = u32_at(head::IMG_CHUNK_NUM_OFFSET) as usize;
    let override_chunk_offset = u32_at(head::OVERRIDE_CHUNK_OFFSET_OFFSET) as usize;
    let override_chunk_num = u32_at(head::OVERRIDE_CHUNK_NUM_OFFSET) as usize;
    let virt_chunk_offset = u32_at(head::VIRT_CHUNK_OFFSET_OFFSET) as usize;
    let virt_chunk_num = u32_at(head::VIRT_CHUNK_NUM_OFFSET) as usize;
    let file_replace_offset = u32_at(head::FILE_REPLACE_OFFSET_OFFSET) as usize;
    let file_replace_present = u32_at(head::FILE_REPLACE_PRESENT_OFFSET) != 0;

    let bounds_err = |field: &'static str| bad(ChainErrorReason::OutOfBounds { field });

    let img_chunks_end = img_chunk_offset
        .checked_add(img_chunk_num.checked_mul(super::img_chunk::WIRE_SIZE).ok_or_else(|| bounds_err("img_chunks"))?)
        .ok_or_else(|| bounds_err("img_chunks"))?;
    if img_chunks_end > bytes.len() {
        return Err(bounds_err("img_chunks"));
    }
    let mut img_chunks = Vec::with_capacity(img_chunk_num);
    for i in 0..img_chunk_num {
        let start = img_chunk_offset + i * super::img_chunk::WIRE_SIZE;
        img_chunks.push(ImgChunk::from_bytes(&bytes[start..start + super::img_chunk::WIRE_SIZE]));
    }

    let mut override_chunks = Vec::with_capacity(override_chunk_num);
    let mut cursor = override_chunk_offset;
    for _ in 0..override_chunk_num {
        if cursor + super::override_chunk::HEADER_SIZE > bytes.len() {
            return Err(bounds_err("override_chunks"));
        }
        let header = &bytes[cursor..cursor + super::override_chunk::HEADER_SIZE];
        let size = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        let data_start = cursor + super::override_chunk::HEADER_SIZE;
        if data_start + size > bytes.len() {
            return Err(bounds_err("override_chunks"));
        }
        override_chunks.push(OverrideChunk::from_bytes(header, &bytes[data_start..data_start + size]));
        cursor = data_start + size;
    }

    let virt_chunks_end = virt_chunk_offset
        .checked_add(virt_chunk_num.checked_mul(48).ok_or_else(|| bounds_err("virt_chunks"))?)
        .ok_or_else(|| bounds_err("virt_chunks"))?;
    if virt_chunks_end > bytes.len() {
        return Err(bounds_err("virt_chunks"));
    }
    let mut virt_chunks = Vec::with_capacity(virt_chunk_num);
    for i in 0..virt_chunk_num {
        let start = virt_chunk_offset + i * 48;
        virt_chunks.push(VirtChunk::from_bytes(&bytes[start..start + 48]));
    }

    let file_replace = if file_replace_present {
        let size = 4 + MAX_OLD_NAMES * NAME_MAX + 4;
        if file_replace_offset + size > bytes.len() {
            return Err(bounds_err("file_replace"));
        }
        Some(FileReplaceRecord::from_bytes(
            &bytes[file_replace_offset..file_replace_offset + size],
        ))
    } else {
        None
    };

    let chain = Chain {
        disk_drive,
        disk_sector_size,
        real_img_size,
        virt_img_size,
        boot_catalog,
        boot_catalog_sector,
        memdisk,
        os_param: param,
        img_chunks,
        override_chunks,
        virt_chunks,
        file_replace,
        blob: bytes.to_vec(),
    };
    chain.validate()?;
    Ok(chain)
}

/// Serialises a [`Chain`] back to the exact on-wire layout `load` accepts.
/// Used by `Chain::build`-style construction in tests and by `ventoyctl`.
pub fn serialize(chain: &Chain) -> Vec<u8> {
    let file_replace_size = 4 + MAX_OLD_NAMES * NAME_MAX + 4;

    let mut override_section = Vec::new();
    for o in &chain.override_chunks {
        override_section.extend_from_slice(&o.header_bytes());
        override_section.extend_from_slice(&o.override_data);
    }

    let img_chunk_offset = head::HEADER_SIZE;
    let img_chunk_bytes = chain.img_chunks.len() * super::img_chunk::WIRE_SIZE;
    let override_chunk_offset = img_chunk_offset + img_chunk_bytes;
    let virt_chunk_offset = override_chunk_offset + override_section.len();
    let virt_chunk_bytes = chain.virt_chunks.len() * 48;
    let file_replace_offset = virt_chunk_offset + virt_chunk_bytes;
    let total = file_replace_offset + file_replace_size;

    let mut out = vec![0u8; total];
    out[head::MAGIC_OFFSET..head::MAGIC_OFFSET + 16].copy_from_slice(&head::MAGIC);
    out[head::DISK_DRIVE_OFFSET] = chain.disk_drive;
    out[head::SECTOR_SIZE_OFFSET..head::SECTOR_SIZE_OFFSET + 4]
        .copy_from_slice(&chain.disk_sector_size.bytes().to_le_bytes());
    out[head::REAL_IMG_SIZE_OFFSET..head::REAL_IMG_SIZE_OFFSET + 8]
        .copy_from_slice(&chain.real_img_size.to_le_bytes());
    out[head::VIRT_IMG_SIZE_OFFSET..head::VIRT_IMG_SIZE_OFFSET + 8]
        .copy_from_slice(&chain.virt_img_size.to_le_bytes());
    out[head::BOOT_CATALOG_OFFSET..head::BOOT_CATALOG_OFFSET + 4]
        .copy_from_slice(&chain.boot_catalog.to_le_bytes());
    let flags = if chain.memdisk { head::FLAG_MEMDISK } else { 0 };
    out[head::FLAGS_OFFSET..head::FLAGS_OFFSET + 4].copy_from_slice(&flags.to_le_bytes());
    out[head::BOOT_CATALOG_SECTOR_OFFSET..head::BOOT_CATALOG_SECTOR_OFFSET + 512]
        .copy_from_slice(&chain.boot_catalog_sector);
    out[head::OS_PARAM_OFFSET..head::OS_PARAM_OFFSET + os_param::WIRE_SIZE]
        .copy_from_slice(&chain.os_param.to_bytes());

    out[head::IMG_CHUNK_OFFSET_OFFSET..head::IMG_CHUNK_OFFSET_OFFSET + 4]
        .copy_from_slice(&(img_chunk_offset as u32).to_le_bytes());
    out[head::IMG_CHUNK_NUM_OFFSET..head::IMG_CHUNK_NUM_OFFSET + 4]
        .copy_from_slice(&(chain.img_chunks.len() as u32).to_le_bytes());
    out[head::OVERRIDE_CHUNK_OFFSET_OFFSET..head::OVERRIDE_CHUNK_OFFSET_OFFSET + 4]
        .copy_from_slice(&(override_chunk_offset as u32).to_le_bytes());
    out[head::OVERRIDE_CHUNK_NUM_OFFSET..head::OVERRIDE_CHUNK_NUM_OFFSET + 4]
        .copy_from_slice(&(chain.override_chunks.len() as u32).to_le_bytes());
    out[head::VIRT_CHUNK_OFFSET_OFFSET..head::VIRT_CHUNK_OFFSET_OFFSET + 4]
        .copy_from_slice(&(virt_chunk_offset as u32).to_le_bytes());
    out[head::VIRT_CHUNK_NUM_OFFSET..head::VIRT_CHUNK_NUM_OFFSET + 4]
        .copy_from_slice(&(chain.virt_chunks.len() as u32).to_le_bytes());
    out[head::FILE_REPLACE_OFFSET_OFFSET..head::FILE_REPLACE_OFFSET_OFFSET + 4]
        .copy_from_slice(&(file_replace_offset as u32).to_le_bytes());
    out[head::FILE_REPLACE_PRESENT_OFFSET..head::FILE_REPLACE_PRESENT_OFFSET + 4]
        .copy_from_slice(&(chain.file_replace.is_some() as u32).to_le_bytes());

    for (i, chunk) in chain.img_chunks.iter().enumerate() {
        let start = img_chunk_offset + i * super::img_chunk::WIRE_SIZE;
        out[start..start + super::img_chunk::WIRE_SIZE].copy_from_slice(&chunk.to_bytes());
    }

    out[override_chunk_offset..override_chunk_offset + override_section.len()]
        .copy_from_slice(&override_section);

    for (i, chunk) in chain.virt_chunks.iter().enumerate() {
        let start = virt_chunk_offset + i * 48;
        out[start..start + 48].copy_from_slice(&chunk.to_bytes());
    }

    if let Some(fr) = &chain.file_replace {
        let mut buf = vec![0u8; file_replace_size];
        buf[0..4].copy_from_slice(&fr.magic.to_le_bytes());
        for (i, name) in fr.old_file_names.iter().enumerate() {
            let start = 4 + i * NAME_MAX;
            let bytes = name.as_bytes();
            let n = bytes.len().min(NAME_MAX - 1);
            buf[start..start + n].copy_from_slice(&bytes[..n]);
        }
        let id_off = 4 + MAX_OLD_NAMES * NAME_MAX;
        buf[id_off..id_off + 4].copy_from_slice(&fr.new_file_virtual_id.to_le_bytes());
        out[file_replace_offset..file_replace_offset + file_replace_size].copy_from_slice(&buf);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::file_replace::FileReplaceRecord;

    fn sample_chain() -> Chain {
        Chain {
            disk_drive: 0x80,
            disk_sector_size: SectorSize::new(512).unwrap(),
            real_img_size: 8 * 2048,
            virt_img_size: 10 * 2048,
            boot_catalog: 0,
            boot_catalog_sector: [0u8; 512],
            memdisk: false,
            os_param: OsParam::new([7; 16], 123456, 1, 0x83, "/boot/guest.iso", 8 * 2048),
            img_chunks: vec![
                ImgChunk {
                    img_start_sector: 0,
                    img_end_sector: 3,
                    disk_start_sector: 1000,
                    disk_end_sector: 1015,
                },
                ImgChunk {
                    img_start_sector: 4,
                    img_end_sector: 7,
                    disk_start_sector: 2000,
                    disk_end_sector: 2015,
                },
            ],
            override_chunks: vec![OverrideChunk {
                img_offset: 4096,
                override_data: vec![0xAA; 100],
            }],
            virt_chunks: vec![VirtChunk {
                mem_sector_start: 8,
                mem_sector_end: 9,
                mem_sector_offset: 0,
                remap_sector_start: 9,
                remap_sector_end: 10,
                org_sector_start: 2,
            }],
            file_replace: Some(FileReplaceRecord {
                magic: crate::chain::file_replace::MAGIC,
                old_file_names: [
                    "initrd.img".to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                ],
                new_file_virtual_id: 0,
            }),
            blob: vec![],
        }
    }

    #[test]
    fn roundtrips_through_load() {
        let chain = sample_chain();
        let bytes = serialize(&chain);
        let loaded = load(&bytes).expect("load should succeed");
        assert_eq!(loaded.disk_drive, chain.disk_drive);
        assert_eq!(loaded.img_chunks, chain.img_chunks);
        assert_eq!(loaded.override_chunks, chain.override_chunks);
        assert_eq!(loaded.virt_chunks, chain.virt_chunks);
        assert_eq!(loaded.file_replace, chain.file_replace);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = serialize(&sample_chain());
        bytes[0] = 0xFF;
        assert!(load(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_blob() {
        let bytes = serialize(&sample_chain());
        assert!(load(&bytes[..head::HEADER_SIZE - 1]).is_err());
    }
}
