//! Binary primitives shared by the VBR decoder and the directory parser.
//!
//! Nothing here touches I/O; every function operates on already-read byte
//! slices so it can be unit tested without a `Read`/`Seek` stream.

/// Little-endian `u16` at the start of `b`.
pub fn unpack_le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

/// Little-endian `u32` at the start of `b`.
pub fn unpack_le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Little-endian `u64` at the start of `b`.
pub fn unpack_le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Big-endian `u16` at the start of `b`. Used only for the boot sector's sync word.
pub fn unpack_be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

/// Hamming weight of a 32-bit word. A plain parallel bit-count rather than a
/// hardware popcount intrinsic, so the result is identical across targets.
pub fn popcount_u32(mut v: u32) -> u32 {
    v -= (v >> 1) & 0x5555_5555;
    v = (v & 0x3333_3333) + ((v >> 2) & 0x3333_3333);
    v = (v + (v >> 4)) & 0x0f0f_0f0f;
    v.wrapping_mul(0x0101_0101) >> 24
}

/// Pulls up to `max_units` little-endian UTF-16 code units out of `raw`.
pub fn utf16le_units(raw: &[u8], max_units: usize) -> Vec<u16> {
    raw.chunks_exact(2)
        .take(max_units)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Decodes UTF-16 code units to a `String`, dropping trailing zero units and
/// substituting the replacement character for anything that doesn't decode.
pub fn utf16_to_utf8(units: &[u16]) -> String {
    let trimmed: Vec<u16> = units
        .iter()
        .copied()
        .take_while(|&u| u != 0)
        .collect();
    char::decode_utf16(trimmed)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

bitflags::bitflags! {
    /// Decoded view of a directory entry's `entry_attr` field.
    ///
    /// This is a convenience accessor layer only; [`crate::dir::Entry::is_dir`]
    /// and [`crate::dir::Entry::is_file`] are defined directly in terms of the
    /// raw `entry_attr` bits so the public data model matches the bit layout
    /// exactly.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FileAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
    }
}

/// Renders a fixed 5-character attribute string (`-` for an absent flag), in
/// the order archive / directory / system / hidden / read-only.
///
/// A primitive only: no path joining, no timestamp rendering. Composing a
/// full human-readable listing line is left to the caller.
pub fn format_attributes(attr: u16) -> String {
    let flags = FileAttributes::from_bits_truncate(attr);
    let bit = |f: FileAttributes, c: char| if flags.contains(f) { c } else { '-' };
    [
        bit(FileAttributes::ARCHIVE, 'a'),
        bit(FileAttributes::DIRECTORY, 'd'),
        bit(FileAttributes::SYSTEM, 's'),
        bit(FileAttributes::HIDDEN, 'h'),
        bit(FileAttributes::READ_ONLY, 'r'),
    ]
    .iter()
    .collect()
}

/// A packed exFAT timestamp, decomposed into its calendar fields.
///
/// No string formatting lives here; that is caller-facing output and out of
/// scope for this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DosTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u16,
}

impl DosTimestamp {
    /// Decomposes a packed `datetime` field plus its associated 10ms counter.
    pub fn from_raw(datetime: u32, ms10: u8) -> Self {
        let year = (datetime >> 25) as u16 + 1980;
        let month = ((datetime >> 21) & 0x0f) as u8;
        let day = ((datetime >> 16) & 0x1f) as u8;
        let hour = ((datetime >> 11) & 0x1f) as u8;
        let minute = ((datetime >> 5) & 0x3f) as u8;
        let second = ((datetime & 0x1f) * 2) as u8;
        DosTimestamp {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millis: ms10 as u16 * 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_matches_from_le_bytes() {
        let b = [0x34, 0x12, 0x00, 0x00, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(unpack_le_u16(&b), 0x1234);
        assert_eq!(unpack_le_u32(&b), 0x1234);
        assert_eq!(unpack_le_u64(&b), 0x1234_5678_0000_1234);
    }

    #[test]
    fn be_sync_word() {
        assert_eq!(unpack_be_u16(&[0x55, 0xAA]), 0x55AA);
    }

    #[test]
    fn popcount_known_values() {
        assert_eq!(popcount_u32(0), 0);
        assert_eq!(popcount_u32(0xFFFF_FFFF), 32);
        assert_eq!(popcount_u32(0x03), 2);
    }

    #[test]
    fn utf16_round_trip_hello() {
        let raw: Vec<u8> = "hello".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let units = utf16le_units(&raw, 5);
        assert_eq!(utf16_to_utf8(&units), "hello");
    }

    #[test]
    fn attributes_string_layout() {
        assert_eq!(format_attributes(0), "-----");
        assert_eq!(format_attributes(0x0010), "-d---");
        assert_eq!(format_attributes(0x0001 | 0x0020), "a---r");
    }

    #[test]
    fn timestamp_all_zero_is_1980() {
        let ts = DosTimestamp::from_raw(0, 0);
        assert_eq!(ts.year, 1980);
        assert_eq!(ts.month, 0);
        assert_eq!(ts.day, 0);
    }
}
