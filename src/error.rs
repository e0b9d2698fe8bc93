//! Error types for the read path.
//!
//! Unlike the write path's per-subsystem error enums, the decoder has a
//! shallow, mostly linear call graph: one flat enum covers every fallible
//! operation, with `#[from] std::io::Error` for whatever the underlying
//! stream throws at us.

/// Everything that can go wrong while opening or reading an exFAT volume.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing boot sector sync word (0x55AA)")]
    BadSyncWord,
    #[error("not an exFAT filesystem (signature mismatch)")]
    BadSignature,
    #[error("VBR self-reported offset does not match the requested offset")]
    BadVbrOffset,
    #[error("cluster index or count out of range for this volume")]
    OutOfRange,
    #[error("FAT offset computation exceeds the FAT region")]
    FatOutOfBounds,
    #[error("short read: got {} bytes", .0.len())]
    ShortRead(Vec<u8>),
    #[error("operation not valid on an invalid or virtual directory entry")]
    InvalidEntry,
    #[error("operation not valid on a deleted entry")]
    DeletedEntry,
    #[error("allocation bitmap has not been loaded yet (call read_root_dir first)")]
    RootNotParsed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
