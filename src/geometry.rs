//! Decoding of the exFAT Volume Boot Record (VBR) into volume geometry.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::primitives::{unpack_be_u16, unpack_le_u16, unpack_le_u32, unpack_le_u64};

/// Fixed probe stride for the initial VBR read, independent of the volume's
/// self-reported sector size (which isn't known yet at this point).
const PROBE_SECTOR_SIZE: u64 = 512;
const VBR_SECTORS: usize = 12;

const OFF_SYNC: usize = 0x1FE;
const OFF_SIGNATURE: usize = 0x03;
const SIGNATURE: &[u8] = b"EXFAT   ";
const OFF_PARTITION_OFFSET: usize = 0x40;
const OFF_VOLUME_LENGTH: usize = 0x48;
const OFF_FAT_OFFSET: usize = 0x50;
const OFF_FAT_LENGTH: usize = 0x54;
const OFF_CLUSTER_HEAP_OFFSET: usize = 0x58;
const OFF_CLUSTER_COUNT: usize = 0x5C;
const OFF_ROOT_DIR_CLUSTER: usize = 0x60;
const OFF_SERIAL: usize = 0x64;
const OFF_VERSION: usize = 0x68;
const OFF_SECTOR_SHIFT: usize = 0x6C;
const OFF_CLUSTER_SHIFT: usize = 0x6D;
const OFF_PERCENT_IN_USE: usize = 0x70;

/// Immutable, once-computed description of an open exFAT volume's on-disk
/// layout. Nothing in this type is ever mutated after [`Geometry::read`]
/// returns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub vbr_offset: u64,
    pub volume_size: u64,
    pub fat_offset: u32,
    pub fat_size: u32,
    pub data_region_offset: u32,
    pub nb_clusters: u32,
    pub root_dir_cluster: u32,
    pub serial: u32,
    pub version: u16,
    pub sector_size: u32,
    pub sectors_per_cluster: u32,
    pub cluster_size: u32,
    pub percent_in_use: u8,

    pub vbr_start: u64,
    pub first_fat: u64,
    pub data_area_start: u64,
}

impl Geometry {
    /// Reads and validates the boot sector at `offset` (in `PROBE_SECTOR_SIZE`
    /// units, i.e. 512-byte units, matching the fixed probe stride). In
    /// `optimistic` mode the self-reported VBR offset check is skipped.
    pub fn read<R: Read + Seek>(image: &mut R, offset: u64, optimistic: bool) -> Result<Geometry> {
        image.seek(SeekFrom::Start(offset * PROBE_SECTOR_SIZE))?;
        let mut buf = vec![0u8; VBR_SECTORS * PROBE_SECTOR_SIZE as usize];
        image.read_exact(&mut buf)?;

        if unpack_be_u16(&buf[OFF_SYNC..]) != 0x55AA {
            return Err(Error::BadSyncWord);
        }
        if &buf[OFF_SIGNATURE..OFF_SIGNATURE + SIGNATURE.len()] != SIGNATURE {
            return Err(Error::BadSignature);
        }
        if !optimistic {
            let reported = unpack_le_u64(&buf[OFF_PARTITION_OFFSET..]);
            if reported != offset {
                return Err(Error::BadVbrOffset);
            }
        }

        let volume_size = unpack_le_u64(&buf[OFF_VOLUME_LENGTH..]);
        let fat_offset = unpack_le_u32(&buf[OFF_FAT_OFFSET..]);
        let fat_size = unpack_le_u32(&buf[OFF_FAT_LENGTH..]);
        let data_region_offset = unpack_le_u32(&buf[OFF_CLUSTER_HEAP_OFFSET..]);
        let nb_clusters = unpack_le_u32(&buf[OFF_CLUSTER_COUNT..]);
        let root_dir_cluster = unpack_le_u32(&buf[OFF_ROOT_DIR_CLUSTER..]);
        let serial = unpack_le_u32(&buf[OFF_SERIAL..]);
        let version = unpack_le_u16(&buf[OFF_VERSION..]);
        let percent_in_use = buf[OFF_PERCENT_IN_USE];

        let sector_shift = buf[OFF_SECTOR_SHIFT];
        let cluster_shift = buf[OFF_CLUSTER_SHIFT];
        let sector_size = 1u32 << sector_shift;
        let sectors_per_cluster = 1u32 << cluster_shift;
        let cluster_size = sector_size * sectors_per_cluster;

        let vbr_start = offset * PROBE_SECTOR_SIZE;
        let first_fat = fat_offset as u64 * sector_size as u64 + vbr_start;
        let data_area_start = vbr_start + data_region_offset as u64 * sector_size as u64;

        Ok(Geometry {
            vbr_offset: offset,
            volume_size,
            fat_offset,
            fat_size,
            data_region_offset,
            nb_clusters,
            root_dir_cluster,
            serial,
            version,
            sector_size,
            sectors_per_cluster,
            cluster_size,
            percent_in_use,
            vbr_start,
            first_fat,
            data_area_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fixture() -> Vec<u8> {
        let mut buf = vec![0u8; VBR_SECTORS * 512];
        buf[OFF_SYNC] = 0x55;
        buf[OFF_SYNC + 1] = 0xAA;
        buf[OFF_SIGNATURE..OFF_SIGNATURE + 8].copy_from_slice(SIGNATURE);
        buf[OFF_SECTOR_SHIFT] = 9; // 512
        buf[OFF_CLUSTER_SHIFT] = 3; // 8 sectors/cluster -> 4096
        buf[OFF_CLUSTER_COUNT..OFF_CLUSTER_COUNT + 4].copy_from_slice(&1000u32.to_le_bytes());
        buf
    }

    #[test]
    fn parses_minimal_vbr() {
        let mut cur = Cursor::new(fixture());
        let geo = Geometry::read(&mut cur, 0, true).unwrap();
        assert_eq!(geo.cluster_size, 4096);
        assert_eq!(geo.nb_clusters, 1000);
        assert_eq!(geo.sector_size, 512);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut buf = fixture();
        buf[OFF_SIGNATURE] = b'X';
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            Geometry::read(&mut cur, 0, true),
            Err(Error::BadSignature)
        ));
    }

    #[test]
    fn rejects_bad_sync_word() {
        let mut buf = fixture();
        buf[OFF_SYNC] = 0;
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            Geometry::read(&mut cur, 0, true),
            Err(Error::BadSyncWord)
        ));
    }

    #[test]
    fn strict_mode_checks_reported_offset() {
        let mut buf = fixture();
        buf[OFF_PARTITION_OFFSET] = 1; // self-reports offset 1, but we ask for 0
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            Geometry::read(&mut cur, 0, false),
            Err(Error::BadVbrOffset)
        ));
    }
}
