//! The directory-set state machine: turns a flat buffer of 32-byte records
//! into logical entries, folding the per-set checksum and assembling UTF-16
//! filenames along the way.

use crate::dir::record::{
    self, cluster_backed_fields, file_fields, stream_ext_fields, validate_bitmap, validate_file,
    validate_file_name, validate_stream_ext, validate_upcase, validate_volume_label, RECORD_LEN,
};
use crate::dir::Entry;
use crate::geometry::Geometry;
use crate::primitives::{utf16_to_utf8, utf16le_units};

/// Side effects and emitted entries produced by parsing one directory block.
#[derive(Default)]
pub struct ParseOutcome {
    pub entries: Vec<Entry>,
    pub bitmap: Option<Entry>,
    pub upcase: Option<Entry>,
    pub volume_label: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    FileSeen,
    LastNameSeen,
}

struct InFlightSet {
    remaining_sc: u8,
    secondary_count: u8,
    expected_name_len: u8,
    expected_checksum: u16,
    running_checksum: u16,
    name_units: Vec<u16>,
    etype: u8,
    entry_attr: u16,
    created: u32,
    modified: u32,
    accessed: u32,
    created_10ms: u8,
    modified_10ms: u8,
    no_fat_chain: bool,
    entry_cluster: u32,
    data_len: u64,
    valid_data_len: u64,
}

/// Parses a directory buffer into logical entries by walking the
/// File -> Stream-Extension -> File-Name record sequence and folding the
/// set checksum along the way. `optimistic` keeps a name whose checksum
/// doesn't match.
pub fn parse_dir_block(buf: &[u8], geom: &Geometry, optimistic: bool) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    let mut state = State::Start;
    let mut set: Option<InFlightSet> = None;

    let mut offset = 0usize;
    while offset + RECORD_LEN <= buf.len() {
        let rec: [u8; RECORD_LEN] = buf[offset..offset + RECORD_LEN].try_into().unwrap();
        offset += RECORD_LEN;

        if rec[0] == record::TYPE_END_OF_DIRECTORY {
            break;
        }

        let normal = record::type_normal(rec[0]);

        if normal == record::TYPE_FILE {
            if !validate_file(&rec) {
                log::debug!("skipping malformed File record (secondary_count={})", rec[1]);
                state = State::Start;
                set = None;
                continue;
            }
            let f = file_fields(&rec);
            let running = fold_into(0, &rec, true);
            set = Some(InFlightSet {
                remaining_sc: f.secondary_count,
                secondary_count: f.secondary_count,
                expected_name_len: 0,
                expected_checksum: f.expected_checksum,
                running_checksum: running,
                name_units: Vec::new(),
                etype: rec[0],
                entry_attr: f.entry_attr,
                created: f.created,
                modified: f.modified,
                accessed: f.accessed,
                created_10ms: f.created_10ms,
                modified_10ms: f.modified_10ms,
                no_fat_chain: false,
                entry_cluster: 0,
                data_len: 0,
                valid_data_len: 0,
            });
            state = State::FileSeen;
            continue;
        }

        if state == State::FileSeen {
            let in_flight = set.as_mut().expect("FileSeen implies an in-flight set");
            let awaiting_stream_ext = in_flight.remaining_sc == in_flight.secondary_count;

            if awaiting_stream_ext && normal == record::TYPE_STREAM_EXT {
                if !validate_stream_ext(&rec, geom.nb_clusters, geom.cluster_size) {
                    log::debug!("skipping malformed Stream-Extension record, aborting set");
                    state = State::Start;
                    set = None;
                    continue;
                }
                let s = stream_ext_fields(&rec);
                in_flight.running_checksum = fold_into(in_flight.running_checksum, &rec, false);
                in_flight.no_fat_chain = s.no_fat_chain;
                in_flight.entry_cluster = s.first_cluster;
                in_flight.data_len = s.data_len;
                in_flight.valid_data_len = s.valid_data_len;
                in_flight.expected_name_len = s.name_len;
                in_flight.remaining_sc -= 1;
                continue;
            }

            if !awaiting_stream_ext && in_flight.remaining_sc >= 1 && normal == record::TYPE_FILE_NAME
            {
                if !validate_file_name(&rec) {
                    log::debug!("skipping malformed File-Name record, aborting set");
                    state = State::Start;
                    set = None;
                    continue;
                }
                in_flight.running_checksum = fold_into(in_flight.running_checksum, &rec, false);
                let units = utf16le_units(&rec[2..32], 15);
                in_flight.name_units.extend_from_slice(&units);
                in_flight.remaining_sc -= 1;

                if in_flight.remaining_sc == 0 {
                    let mut finished = set.take().unwrap();
                    finished
                        .name_units
                        .truncate(finished.expected_name_len as usize);
                    let checksum_ok = finished.expected_checksum == finished.running_checksum;
                    let mut name = if checksum_ok || optimistic {
                        utf16_to_utf8(&finished.name_units)
                    } else {
                        String::new()
                    };
                    let deleted = !record::in_use(finished.etype);
                    if deleted {
                        name.push_str(" (deleted)");
                    }
                    out.entries.push(Entry {
                        etype: finished.etype,
                        data_len: finished.data_len,
                        valid_data_len: finished.valid_data_len,
                        entry_cluster: finished.entry_cluster,
                        name_len: finished.expected_name_len,
                        created: finished.created,
                        modified: finished.modified,
                        accessed: finished.accessed,
                        created_10ms: finished.created_10ms,
                        modified_10ms: finished.modified_10ms,
                        entry_attr: finished.entry_attr,
                        no_fat_chain: finished.no_fat_chain,
                        secondary_count: finished.secondary_count,
                        name,
                    });
                    state = State::LastNameSeen;
                }
                continue;
            }

            // Anything else mid-set breaks the expected sequence: abort and
            // fall through to the ordinary top-level dispatch for this record.
            log::debug!("unexpected record type 0x{:02x} mid-set, aborting set", rec[0]);
            state = State::Start;
            set = None;
        }

        match normal {
            record::TYPE_VOLUME_LABEL => {
                if !validate_volume_label(&rec) {
                    log::debug!("skipping malformed Volume Label record");
                    continue;
                }
                if record::in_use(rec[0]) {
                    let len = rec[1] as usize;
                    let raw = &rec[2..2 + 2 * len];
                    let units = utf16le_units(raw, len);
                    out.volume_label = Some(utf16_to_utf8(&units));
                } else {
                    out.volume_label = None;
                }
            }
            record::TYPE_BITMAP => {
                if !validate_bitmap(&rec, geom.nb_clusters) {
                    log::debug!("skipping malformed Bitmap record");
                    continue;
                }
                let f = cluster_backed_fields(&rec);
                out.bitmap = Some(Entry {
                    etype: rec[0],
                    data_len: f.length,
                    valid_data_len: f.length,
                    entry_cluster: f.first_cluster,
                    name_len: 7,
                    created: 0,
                    modified: 0,
                    accessed: 0,
                    created_10ms: 0,
                    modified_10ms: 0,
                    entry_attr: 0,
                    no_fat_chain: true,
                    secondary_count: 0,
                    name: "$BitMap".to_string(),
                });
            }
            record::TYPE_UPCASE => {
                if !validate_upcase(&rec, geom.nb_clusters, geom.cluster_size) {
                    log::debug!("skipping malformed Upcase Table record");
                    continue;
                }
                let f = cluster_backed_fields(&rec);
                out.upcase = Some(Entry {
                    etype: rec[0],
                    data_len: f.length,
                    valid_data_len: f.length,
                    entry_cluster: f.first_cluster,
                    name_len: 7,
                    created: 0,
                    modified: 0,
                    accessed: 0,
                    created_10ms: 0,
                    modified_10ms: 0,
                    entry_attr: 0,
                    no_fat_chain: true,
                    secondary_count: 0,
                    name: "$UpCase".to_string(),
                });
            }
            record::TYPE_VOLUME_GUID => {
                // Recognized only; no entry emitted, no side effect recorded.
            }
            _ => {
                log::debug!("skipping unrecognized record type 0x{:02x}", rec[0]);
            }
        }
    }

    out
}

fn fold_into(accum: u16, rec: &[u8; RECORD_LEN], is_primary: bool) -> u16 {
    let mut a = accum;
    for (i, &b) in rec.iter().enumerate() {
        let byte = if is_primary && (i == 2 || i == 3) { 0 } else { b };
        a = a.rotate_right(1).wrapping_add(byte as u16);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> Geometry {
        Geometry {
            vbr_offset: 0,
            volume_size: 0,
            fat_offset: 0,
            fat_size: 0,
            data_region_offset: 0,
            nb_clusters: 1000,
            root_dir_cluster: 2,
            serial: 0,
            version: 0,
            sector_size: 512,
            sectors_per_cluster: 8,
            cluster_size: 4096,
            percent_in_use: 0,
            vbr_start: 0,
            first_fat: 0,
            data_area_start: 0,
        }
    }

    fn build_hello_set(primary_type: u8) -> Vec<u8> {
        let mut file = [0u8; RECORD_LEN];
        file[0] = primary_type;
        file[1] = 2; // secondary_count

        let mut stream = [0u8; RECORD_LEN];
        stream[0] = record::TYPE_STREAM_EXT | 0x80;
        stream[3] = 5; // name_len
        stream[20..24].copy_from_slice(&10u32.to_le_bytes());
        stream[24..32].copy_from_slice(&5000u64.to_le_bytes());

        let mut name = [0u8; RECORD_LEN];
        name[0] = record::TYPE_FILE_NAME | 0x80;
        for (i, u) in "hello".encode_utf16().enumerate() {
            name[2 + i * 2..4 + i * 2].copy_from_slice(&u.to_le_bytes());
        }

        // fix up checksum
        let running = fold_into(0, &file, true);
        let running = fold_into(running, &stream, false);
        let running = fold_into(running, &name, false);
        file[2..4].copy_from_slice(&running.to_le_bytes());

        let mut buf = Vec::new();
        buf.extend_from_slice(&file);
        buf.extend_from_slice(&stream);
        buf.extend_from_slice(&name);
        buf
    }

    #[test]
    fn assembles_filename_with_valid_checksum() {
        let buf = build_hello_set(record::TYPE_FILE | 0x80);
        let out = parse_dir_block(&buf, &geom(), false);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].name, "hello");
        assert_eq!(out.entries[0].entry_cluster, 10);
        assert_eq!(out.entries[0].data_len, 5000);
    }

    #[test]
    fn bad_checksum_yields_empty_name_unless_optimistic() {
        let mut buf = build_hello_set(record::TYPE_FILE | 0x80);
        buf[2] ^= 0xFF; // corrupt checksum
        buf[3] ^= 0xFF;
        let out = parse_dir_block(&buf, &geom(), false);
        assert_eq!(out.entries[0].name, "");

        let out_opt = parse_dir_block(&buf, &geom(), true);
        assert_eq!(out_opt.entries[0].name, "hello");
    }

    #[test]
    fn deleted_entry_gets_suffix_even_with_bad_checksum() {
        let mut buf = build_hello_set(record::TYPE_FILE); // in-use bit clear -> 0x05
        buf[2] ^= 0xFF; // corrupt checksum
        buf[3] ^= 0xFF;
        let out = parse_dir_block(&buf, &geom(), false);
        assert_eq!(out.entries[0].name, " (deleted)");
        assert!(out.entries[0].is_deleted());
    }

    #[test]
    fn deleted_file_set_gets_suffix() {
        let buf = build_hello_set(record::TYPE_FILE); // in-use bit clear -> 0x05
        let out = parse_dir_block(&buf, &geom(), false);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].name, "hello (deleted)");
        assert!(out.entries[0].is_deleted());
    }

    #[test]
    fn end_of_directory_marker_yields_nothing() {
        let buf = [0u8; RECORD_LEN];
        let out = parse_dir_block(&buf, &geom(), false);
        assert!(out.entries.is_empty());
    }

    #[test]
    fn truncated_tail_is_not_emitted() {
        let mut buf = build_hello_set(record::TYPE_FILE | 0x80);
        buf.truncate(RECORD_LEN * 2 + 10); // cut mid File-Name record
        let out = parse_dir_block(&buf, &geom(), false);
        assert!(out.entries.is_empty());
    }
}
