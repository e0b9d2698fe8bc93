//! # exfat-reader
//!
//! A read-only parser and content extractor for the exFAT filesystem.
//!
//! Given any `Read + Seek` byte stream holding (or containing, at a known
//! sector offset) an exFAT volume, this crate decodes the Volume Boot
//! Record, walks the FAT and cluster heap, and assembles directory entries
//! from their on-disk record sets so a caller can list a volume's contents
//! and extract file data.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use exfat_reader::Volume;
//! use std::fs::File;
//!
//! # fn demo() -> exfat_reader::Result<()> {
//! let image = File::open("disk.img")?;
//! let mut volume = Volume::open(image, false, None)?;
//! let root = volume.read_root_dir()?;
//! for entry in &root {
//!     println!("{}", entry.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! This crate only reads. There is no write, format, repair, or defragment
//! support, and TexFAT / volume-GUID semantics beyond recognition are out of
//! scope.

pub mod cluster;
pub mod dir;
pub mod error;
pub mod geometry;
pub mod primitives;
pub mod volume;

pub use dir::Entry;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use primitives::{format_attributes, DosTimestamp, FileAttributes};
pub use volume::Volume;
