//! OS-param publication (C8): the same `OsParam` record pushed out through
//! three channels that must stay in sync — a firmware NV variable, a
//! page-aligned runtime-data allocation, and (BIOS only) either an
//! ACPI-shaped table or a raw low-memory buffer depending on what the
//! guest kernel's command line asks for.

use crate::chain::OsParam;

pub const VENTOY_OS_PARAM_VARIABLE_NAME: &str = "VentoyOsParam";
pub const VENTOY_OS_PARAM_GUID: [u8; 16] = [
    0x9b, 0x2f, 0x77, 0x77, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VariableAttributes: u32 {
        const NON_VOLATILE = 0x1;
        const BOOTSERVICE_ACCESS = 0x2;
        const RUNTIME_ACCESS = 0x4;
    }
}

pub const OS_PARAM_VARIABLE_ATTRIBUTES: VariableAttributes =
    VariableAttributes::from_bits_truncate(
        VariableAttributes::BOOTSERVICE_ACCESS.bits() | VariableAttributes::RUNTIME_ACCESS.bits(),
    );

pub const RUNTIME_DATA_ALIGNMENT: usize = 4096;

/// How the guest kernel expects to rediscover the BIOS-path OS-param
/// blob, selected by a kernel-command-line token (see [`crate::config`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiosDiscoveryMode {
    /// An ACPI-style table the guest locates via its RSDP walk.
    AcpiTable,
    /// A fixed low-memory buffer the guest scans for directly.
    RawMemoryScan,
}

/// The three channels' published payloads, all required to carry the same
/// `OsParam` bytes.
pub struct PublishedOsParam {
    pub firmware_variable: [u8; crate::chain::os_param::WIRE_SIZE],
    pub runtime_data: Vec<u8>,
    pub bios_table: Option<Vec<u8>>,
}

/// Builds every channel's payload from one `OsParam`. `bios_mode` is
/// `None` on pure-UEFI boots, where only the variable and runtime-data
/// allocation are published.
pub fn publish(param: &OsParam, bios_mode: Option<BiosDiscoveryMode>) -> PublishedOsParam {
    let bytes = param.to_bytes();

    let mut runtime_data = vec![0u8; RUNTIME_DATA_ALIGNMENT];
    runtime_data[..bytes.len()].copy_from_slice(&bytes);

    let bios_table = bios_mode.map(|mode| match mode {
        BiosDiscoveryMode::AcpiTable => build_acpi_table(&bytes),
        BiosDiscoveryMode::RawMemoryScan => bytes.to_vec(),
    });

    PublishedOsParam {
        firmware_variable: bytes,
        runtime_data,
        bios_table,
    }
}

const ACPI_HEADER_LEN: usize = 36;

/// Minimal ACPI-style wrapper: a 36-byte header (signature, length,
/// checksum and the rest zeroed — this crate never claims real ACPI
/// compliance, only the shape the guest's table walk needs to find the
/// payload) followed by the raw `OsParam` bytes.
fn build_acpi_table(param_bytes: &[u8]) -> Vec<u8> {
    let mut table = vec![0u8; ACPI_HEADER_LEN + param_bytes.len()];
    table[0..4].copy_from_slice(b"VTOY");
    let total_len = table.len() as u32;
    table[4..8].copy_from_slice(&total_len.to_le_bytes());
    table[ACPI_HEADER_LEN..].copy_from_slice(param_bytes);

    let checksum: u8 = table.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    table[9] = table[9].wrapping_sub(checksum);
    table
}
