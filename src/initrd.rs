//! Initrd augmentation (C7): scans isolinux/grub boot-menu configuration for
//! the initrd paths a guest actually loads, resolves each to an extent
//! inside the image via C2, and builds the cpio newc trailer injected so
//! the guest's early userspace can re-discover the physical disk, picking
//! between the two surfacing strategies below.

use crate::error::{ChunkErr, VentoyError};
use crate::extent::{coalesce, ExtentMapper};
use crate::types::VBD_SECTOR_BYTES;

const CPIO_MAGIC: &[u8; 6] = b"070701";
const TRAILER_NAME: &str = "TRAILER!!!";

/// True for the filenames isolinux/grub boot menus are conventionally
/// stored under. The preparator walks the guest ISO's directory tree (via
/// the same extent mapper used to resolve initrd paths) and feeds any
/// matching file's contents to [`scan_initrd_tokens`].
pub fn looks_like_boot_config(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with("isolinux.cfg") || lower.ends_with("grub.cfg") || lower.ends_with("txt.cfg")
}

/// `APPEND ... initrd=a.img,b.img ...` — isolinux allows a comma-separated
/// list of initrds on one APPEND line.
fn scan_isolinux_initrd_tokens(cfg: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in cfg.lines() {
        let trimmed = line.trim();
        if !trimmed.to_ascii_uppercase().starts_with("APPEND") {
            continue;
        }
        for word in trimmed.split_whitespace() {
            let lower = word.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("initrd=") {
                found.extend(value.split(',').map(|s| s.to_string()));
            }
        }
    }
    found
}

/// `initrd /boot/initrd.img`, `initrd16 ...`, `initrdefi ...` — grub.cfg
/// menuentry lines, one or more paths after the keyword.
fn scan_grub_initrd_tokens(cfg: &str) -> Vec<String> {
    let mut found = Vec::new();
    for line in cfg.lines() {
        let mut words = line.trim().split_whitespace();
        let Some(keyword) = words.next() else {
            continue;
        };
        match keyword.to_ascii_lowercase().as_str() {
            "initrd" | "initrd16" | "initrdefi" => found.extend(words.map(|s| s.to_string())),
            _ => {}
        }
    }
    found
}

/// Collects every initrd path named by one boot-config file, dispatching on
/// the isolinux/grub dialect by the config file's own name.
pub fn scan_initrd_tokens(config_path: &str, contents: &str) -> Vec<String> {
    if config_path.to_ascii_lowercase().contains("grub") {
        scan_grub_initrd_tokens(contents)
    } else {
        scan_isolinux_initrd_tokens(contents)
    }
}

/// Resolves one initrd path to the `(file_offset_in_image, length)` extent
/// C7 injects against. Refuses paths that map to more than one extent after
/// coalescing — isolinux/grub initrds live on ISO-9660, which lays files
/// out contiguously, so a fragmented result means the mapper was pointed at
/// something C7 isn't meant to patch (e.g. a FAT volume with a split file).
pub fn resolve_initrd_extent(
    path: &str,
    mapper: &dyn ExtentMapper,
) -> Result<(u64, u64), VentoyError> {
    let extents = coalesce(mapper.extents(path)?);
    match extents.as_slice() {
        [] => Err(VentoyError::ChunkMappingRefused(ChunkErr::Sparse)),
        [(file_off, _disk_lba, len)] => Ok((file_off * VBD_SECTOR_BYTES, len * VBD_SECTOR_BYTES)),
        multiple => Err(VentoyError::ChunkMappingRefused(ChunkErr::Fragmented(
            multiple.len(),
        ))),
    }
}

/// One initrd path named by a boot config, resolved to its image extent (or
/// the reason it couldn't be).
pub struct ResolvedInitrd {
    pub path: String,
    pub result: Result<(u64, u64), VentoyError>,
}

/// Scans every given `(config_path, contents)` pair for initrd tokens,
/// deduplicates the paths, and resolves each one through `mapper`. This is
/// the full C7 "scan the guest ISO for isolinux/grub configuration files …
/// collect every token that names an initrd and resolve it to an extent"
/// step; the caller supplies config file contents already read off the
/// guest ISO (via the same extent-mapper-backed file access C2 exposes) and
/// the mapper to resolve paths against.
pub fn collect_initrd_extents(
    configs: &[(String, String)],
    mapper: &dyn ExtentMapper,
) -> Vec<ResolvedInitrd> {
    let mut paths: Vec<String> = Vec::new();
    for (config_path, contents) in configs {
        for token in scan_initrd_tokens(config_path, contents) {
            if !paths.contains(&token) {
                paths.push(token);
            }
        }
    }
    paths
        .into_iter()
        .map(|path| {
            let result = resolve_initrd_extent(&path, mapper);
            ResolvedInitrd { path, result }
        })
        .collect()
}

fn pad4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

fn hex8(value: u32) -> [u8; 8] {
    let s = format!("{:08X}", value);
    let mut out = [0u8; 8];
    out.copy_from_slice(s.as_bytes());
    out
}

/// One cpio newc entry: a 110-byte ASCII-hex header, the NUL-terminated
/// name padded to a 4-byte boundary, then the data padded the same way.
pub struct CpioEntry {
    pub name: String,
    pub mode: u32,
    pub mtime: u32,
    pub data: Vec<u8>,
}

impl CpioEntry {
    fn write_header(&self, ino: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(CPIO_MAGIC);
        out.extend_from_slice(&hex8(ino));
        out.extend_from_slice(&hex8(self.mode));
        out.extend_from_slice(&hex8(0)); // c_uid
        out.extend_from_slice(&hex8(0)); // c_gid
        out.extend_from_slice(&hex8(1)); // c_nlink
        out.extend_from_slice(&hex8(self.mtime));
        out.extend_from_slice(&hex8(self.data.len() as u32));
        out.extend_from_slice(&hex8(0)); // c_devmajor
        out.extend_from_slice(&hex8(0)); // c_devminor
        out.extend_from_slice(&hex8(0)); // c_rdevmajor
        out.extend_from_slice(&hex8(0)); // c_rdevminor
        let namesize = self.name.len() as u32 + 1; // NUL terminator
        out.extend_from_slice(&hex8(namesize));
        out.extend_from_slice(&hex8(0)); // c_check
    }

    fn write(&self, ino: u32, out: &mut Vec<u8>) {
        self.write_header(ino, out);
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.resize(out.len() + pad4(out.len()), 0);
        out.extend_from_slice(&self.data);
        out.resize(out.len() + pad4(out.len()), 0);
    }
}

/// Builds the injected cpio archive: the caller-supplied entries (the
/// runtime helper binary and the `OsParam` blob) followed by the
/// mandatory `TRAILER!!!` terminator.
pub fn build_cpio(entries: &[CpioEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        entry.write(i as u32 + 1, &mut out);
    }
    let trailer = CpioEntry {
        name: TRAILER_NAME.to_string(),
        mode: 0,
        mtime: 0,
        data: Vec::new(),
    };
    trailer.write(entries.len() as u32 + 1, &mut out);
    out
}

/// Which of the two C7 surfacing strategies applies to a given initrd
/// extent, based on whether `slack_bytes` after its on-image end is enough
/// to hold the injected cpio trailer in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStrategy {
    /// Append via an OverrideChunk directly onto the initrd's image bytes.
    Override,
    /// Expose a second path via C6 backed by a VirtChunk carrying
    /// `original_initrd_bytes || injected_cpio`.
    VirtAppended,
}

pub fn choose_strategy(injected_len: u64, slack_bytes: u64) -> InjectionStrategy {
    if injected_len <= slack_bytes {
        InjectionStrategy::Override
    } else {
        InjectionStrategy::VirtAppended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_zero_padded_ascii_hex() {
        let entry = CpioEntry {
            name: "ventoy-hook".to_string(),
            mode: 0o100755,
            mtime: 0,
            data: vec![1, 2, 3],
        };
        let mut out = Vec::new();
        entry.write_header(1, &mut out);
        assert_eq!(out.len(), 110);
        assert_eq!(&out[0..6], CPIO_MAGIC);
        assert_eq!(&out[6..14], b"00000001");
    }

    #[test]
    fn entry_padding_aligns_to_four_bytes() {
        let entry = CpioEntry {
            name: "a".to_string(),
            mode: 0o644,
            mtime: 0,
            data: vec![0xAB; 5],
        };
        let mut out = Vec::new();
        entry.write(1, &mut out);
        assert_eq!(out.len() % 4, 0);
    }

    #[test]
    fn archive_ends_with_trailer() {
        let archive = build_cpio(&[CpioEntry {
            name: "osparam.bin".to_string(),
            mode: 0o644,
            mtime: 0,
            data: vec![0u8; 512],
        }]);
        let found = archive
            .windows(TRAILER_NAME.len())
            .any(|w| w == TRAILER_NAME.as_bytes());
        assert!(found);
    }

    #[test]
    fn strategy_prefers_override_when_slack_fits() {
        assert_eq!(choose_strategy(512, 1024), InjectionStrategy::Override);
        assert_eq!(choose_strategy(2048, 512), InjectionStrategy::VirtAppended);
    }

    struct FakeMapper(Vec<(String, Result<Vec<crate::extent::Extent>, ChunkErr>)>);

    impl ExtentMapper for FakeMapper {
        fn extents(&self, path: &str) -> Result<Vec<crate::extent::Extent>, ChunkErr> {
            self.0
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, r)| r.clone())
                .unwrap_or(Err(ChunkErr::Sparse))
        }
    }

    #[test]
    fn looks_like_boot_config_matches_known_filenames() {
        assert!(looks_like_boot_config("/isolinux/isolinux.cfg"));
        assert!(looks_like_boot_config("/boot/grub/grub.cfg"));
        assert!(looks_like_boot_config("/isolinux/txt.cfg"));
        assert!(!looks_like_boot_config("/boot/vmlinuz"));
    }

    #[test]
    fn isolinux_scan_splits_comma_separated_initrds() {
        let cfg = "LABEL linux\n  KERNEL /vmlinuz\n  APPEND initrd=/boot/a.img,/boot/b.img quiet\n";
        let found = scan_initrd_tokens("/isolinux/isolinux.cfg", cfg);
        assert_eq!(found, vec!["/boot/a.img", "/boot/b.img"]);
    }

    #[test]
    fn grub_scan_picks_up_initrd_keyword_variants() {
        let cfg = "menuentry 'Linux' {\n  linux /vmlinuz\n  initrd16 /boot/initrd.img\n}\n";
        let found = scan_initrd_tokens("/boot/grub/grub.cfg", cfg);
        assert_eq!(found, vec!["/boot/initrd.img"]);
    }

    #[test]
    fn resolve_extent_converts_sectors_to_bytes() {
        let mapper = FakeMapper(vec![("/boot/initrd.img".to_string(), Ok(vec![(0, 100, 4)]))]);
        let (offset, len) = resolve_initrd_extent("/boot/initrd.img", &mapper).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(len, 4 * VBD_SECTOR_BYTES);
    }

    #[test]
    fn resolve_extent_refuses_fragmented_file() {
        let mapper = FakeMapper(vec![(
            "/boot/initrd.img".to_string(),
            Ok(vec![(0, 100, 2), (2, 500, 2)]),
        )]);
        assert!(matches!(
            resolve_initrd_extent("/boot/initrd.img", &mapper),
            Err(VentoyError::ChunkMappingRefused(ChunkErr::Fragmented(2)))
        ));
    }

    #[test]
    fn collect_initrd_extents_deduplicates_and_resolves() {
        let cfg = "APPEND initrd=/boot/initrd.img quiet\n";
        let mapper = FakeMapper(vec![("/boot/initrd.img".to_string(), Ok(vec![(0, 100, 1)]))]);
        let configs = vec![
            ("/isolinux/isolinux.cfg".to_string(), cfg.to_string()),
            ("/isolinux/txt.cfg".to_string(), cfg.to_string()),
        ];
        let resolved = collect_initrd_extents(&configs, &mapper);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].path, "/boot/initrd.img");
        assert!(resolved[0].result.is_ok());
    }
}
