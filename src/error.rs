//! Error taxonomy for the VBD runtime. One enum per the error-handling
//! design: library code returns `Result<T, VentoyError>`, the CLI adds
//! `anyhow::Context` on top at the process boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VentoyError {
    #[error("malformed chain: {reason}")]
    MalformedChain { reason: ChainErrorReason },

    #[error("extent mapping refused: {0}")]
    ChunkMappingRefused(#[from] ChunkErr),

    #[error("underlying disk read failed: {0}")]
    UnderlyingIo(#[from] std::io::Error),

    #[error("read past virt_img_size")]
    OutOfRange,

    #[error("write attempted on read-only VBD")]
    WriteAttempted,

    #[error("firmware registration failed: {0}")]
    FirmwareRegistration(String),

    #[error("no recognised boot file found after retries")]
    NoBootFile,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainErrorReason {
    #[error("bad magic GUID")]
    BadMagic,
    #[error("field out of bounds of the blob: {field}")]
    OutOfBounds { field: &'static str },
    #[error("invariant {invariant} violated")]
    InvariantViolation { invariant: &'static str },
    #[error("os_param checksum mismatch")]
    BadChecksum,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkErr {
    #[error("filesystem spans more than one underlying disk")]
    MultiDevice,
    #[error("filesystem uses a non-single RAID/replication profile")]
    Raid,
    #[error("file uses transparent filesystem compression")]
    Compressed,
    #[error("file is encrypted at the filesystem level")]
    Encrypted,
    #[error("file contains sparse holes")]
    Sparse,
    #[error("file is fragmented beyond the supported chunk budget ({0} chunks)")]
    Fragmented(usize),
}

pub type Result<T> = std::result::Result<T, VentoyError>;
