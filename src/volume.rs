//! The public surface: a handle on one open exFAT volume.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::cluster;
use crate::dir::{parse_dir_block, Entry};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::primitives::popcount_u32;

/// A handle on one open exFAT volume.
///
/// `geometry` is computed once in [`Volume::open`] and never changes.
/// `bitmap_entry`/`upcase_entry`/`volume_label` are the only fields mutated
/// after open, and only by [`Volume::read_root_dir`].
pub struct Volume<R> {
    image: R,
    geometry: Geometry,
    optimistic: bool,
    bitmap_entry: Option<Entry>,
    upcase_entry: Option<Entry>,
    volume_label: Option<String>,
}

impl<R: Read + Seek> Volume<R> {
    /// Opens `image` as an exFAT volume starting at sector `offset` (default 0
    /// when `None`). In `optimistic` mode, VBR self-offset mismatches are
    /// tolerated and directory-set checksum mismatches don't blank a name.
    pub fn open(mut image: R, optimistic: bool, offset: Option<u64>) -> Result<Self> {
        let geometry = Geometry::read(&mut image, offset.unwrap_or(0), optimistic)?;
        Ok(Volume {
            image,
            geometry,
            optimistic,
            bitmap_entry: None,
            upcase_entry: None,
            volume_label: None,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn volume_label(&self) -> Option<&str> {
        self.volume_label.as_deref()
    }

    /// Reads the chain of clusters starting at `first` to the end-of-chain
    /// sentinel, tolerating a short final read (benign end of image content).
    fn read_chain_lenient(&mut self, first: u32) -> Result<Vec<u8>> {
        let clusters = cluster::chained_cluster_list(&mut self.image, &self.geometry, first)?;
        let mut buf = Vec::with_capacity(clusters.len() * self.geometry.cluster_size as usize);
        for c in clusters {
            match cluster::read_clusters(&mut self.image, &self.geometry, c, 1) {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(Error::ShortRead(partial)) => {
                    buf.extend_from_slice(&partial);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(buf)
    }

    /// Reads an entry's declared content leniently: a short read near the end
    /// of the image yields whatever was read rather than aborting.
    fn read_entry_content_lenient(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        if entry.data_len == 0 {
            return Ok(Vec::new());
        }
        match cluster::read_content(
            &mut self.image,
            &self.geometry,
            entry.entry_cluster,
            entry.data_len,
            entry.no_fat_chain,
        ) {
            Ok(buf) => Ok(buf),
            Err(Error::ShortRead(partial)) => Ok(partial),
            Err(e) => Err(e),
        }
    }

    /// Reads and parses the root directory, applying its Bitmap/Upcase/label
    /// side effects to this volume. Only a root parse is permitted to populate
    /// these fields; a subdirectory parse discards them (see [`Volume::read_dir`]).
    pub fn read_root_dir(&mut self) -> Result<Vec<Entry>> {
        let root_cluster = self.geometry.root_dir_cluster;
        let buf = self.read_chain_lenient(root_cluster)?;
        let outcome = parse_dir_block(&buf, &self.geometry, self.optimistic);
        self.bitmap_entry = outcome.bitmap;
        self.upcase_entry = outcome.upcase;
        self.volume_label = outcome.volume_label;
        Ok(outcome.entries)
    }

    /// Reads a subdirectory's entries. Non-directory, deleted, invalid, or
    /// unnamed entries yield an empty list rather than erroring. Any
    /// Bitmap/Upcase/label records found in a subdirectory parse (which
    /// should not normally occur) are discarded rather than applied.
    pub fn read_dir(&mut self, entry: &Entry) -> Result<Vec<Entry>> {
        if entry.non_parsable() {
            return Ok(Vec::new());
        }
        let buf = self.read_entry_content_lenient(entry)?;
        let outcome = parse_dir_block(&buf, &self.geometry, self.optimistic);
        Ok(outcome.entries)
    }

    /// Breadth-first expansion of `roots`: every directory in the current
    /// level is read before moving to the next level. Returns every entry
    /// visited (roots included), optionally restricted to indexable ones.
    pub fn get_all_entries(&mut self, roots: &[Entry], indexable_only: bool) -> Result<Vec<Entry>> {
        let mut result = Vec::new();
        let mut level: VecDeque<Entry> = roots.iter().cloned().collect();
        while !level.is_empty() {
            let mut next = VecDeque::new();
            for entry in level.drain(..) {
                let is_dir = entry.is_dir();
                if !indexable_only || entry.is_indexable() {
                    result.push(entry.clone());
                }
                if is_dir && !entry.non_parsable() {
                    for child in self.read_dir(&entry)? {
                        next.push_back(child);
                    }
                }
            }
            level = next;
        }
        Ok(result)
    }

    /// Resolves the ordered cluster list and trailing-byte count for an
    /// entry's content.
    pub fn get_cluster_list(&mut self, entry: &Entry) -> Result<(Vec<u32>, u32)> {
        cluster::cluster_list(
            &mut self.image,
            &self.geometry,
            entry.entry_cluster,
            entry.data_len,
            entry.no_fat_chain,
        )
    }

    pub fn count_clusters(&mut self, entry: &Entry) -> Result<u32> {
        Ok(self.get_cluster_list(entry)?.0.len() as u32)
    }

    pub fn get_cluster_offset(&self, c: u32) -> u64 {
        cluster::cluster_offset(&self.geometry, c)
    }

    pub fn get_cluster_size(&self) -> u32 {
        self.geometry.cluster_size
    }

    /// Writes an entry's full content to `dst`. Rejects invalid or deleted
    /// entries; a short underlying read is a hard error here (unlike
    /// directory/bitmap reads, a partially extracted file has no useful
    /// partial-success semantics).
    pub fn extract_entry_content(&mut self, entry: &Entry, dst: &Path) -> Result<()> {
        if entry.is_invalid() {
            return Err(Error::InvalidEntry);
        }
        if entry.is_deleted() {
            return Err(Error::DeletedEntry);
        }
        let (clusters, tail) = self.get_cluster_list(entry)?;
        let mut out = File::create(dst)?;
        for (i, &c) in clusters.iter().enumerate() {
            let bytes = cluster::read_clusters(&mut self.image, &self.geometry, c, 1)?;
            if i + 1 == clusters.len() {
                out.write_all(&bytes[..tail as usize])?;
            } else {
                out.write_all(&bytes)?;
            }
        }
        Ok(())
    }

    /// Depth-first: writes every valid, non-directory, indexable entry
    /// reachable from `roots` into `dst_dir`, named by its own entry name.
    pub fn extract_all_files(&mut self, roots: &[Entry], dst_dir: &Path) -> Result<()> {
        for root in roots {
            self.extract_all_files_one(root, dst_dir)?;
        }
        Ok(())
    }

    fn extract_all_files_one(&mut self, entry: &Entry, dst_dir: &Path) -> Result<()> {
        if entry.is_dir() {
            if entry.non_parsable() {
                return Ok(());
            }
            for child in self.read_dir(entry)? {
                self.extract_all_files_one(&child, dst_dir)?;
            }
            return Ok(());
        }
        if entry.is_file() && entry.is_indexable() {
            let dst = dst_dir.join(&entry.name);
            self.extract_entry_content(entry, &dst)?;
        }
        Ok(())
    }

    /// Depth-first traversal that hands the caller `(entry, full_path)` for
    /// every visited entry, writing nothing. Path/attribute/timestamp
    /// formatting is the caller's job, not this crate's.
    pub fn show_all_entries_info(
        &mut self,
        roots: &[Entry],
        callback: &mut dyn FnMut(&Entry, &str),
    ) -> Result<()> {
        for root in roots {
            self.show_all_entries_info_one(root, "", callback)?;
        }
        Ok(())
    }

    fn show_all_entries_info_one(
        &mut self,
        entry: &Entry,
        parent_path: &str,
        callback: &mut dyn FnMut(&Entry, &str),
    ) -> Result<()> {
        let full_path = if parent_path.is_empty() {
            entry.name.clone()
        } else {
            format!("{parent_path}/{}", entry.name)
        };
        callback(entry, &full_path);
        if entry.is_dir() && !entry.non_parsable() {
            for child in self.read_dir(entry)? {
                self.show_all_entries_info_one(&child, &full_path, callback)?;
            }
        }
        Ok(())
    }

    /// Sum of set bits across the allocation bitmap's content.
    pub fn get_allocated_clusters(&mut self) -> Result<u32> {
        let bitmap = self.bitmap_entry.clone().ok_or(Error::RootNotParsed)?;
        let bytes = self.read_entry_content_lenient(&bitmap)?;
        Ok(count_set_bits(&bytes))
    }

    pub fn get_free_clusters(&mut self) -> Result<u32> {
        Ok(self.geometry.nb_clusters - self.get_allocated_clusters()?)
    }

    /// The VBR's self-reported percent-in-use, as a `"NN%"` string.
    pub fn get_used_space(&self) -> String {
        format!("{}%", self.geometry.percent_in_use)
    }
}

/// Popcounts `bytes` as a sequence of 32-bit little-endian words, with a
/// trailing partial word zero-extended and masked to the bytes actually
/// present before counting.
fn count_set_bits(bytes: &[u8]) -> u32 {
    let mut total = 0u32;
    let mut chunks = bytes.chunks_exact(4);
    for c in &mut chunks {
        total += popcount_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut word = [0u8; 4];
        word[..rem.len()].copy_from_slice(rem);
        let mask = (1u64 << (8 * rem.len())) as u32 - 1;
        total += popcount_u32(u32::from_le_bytes(word) & mask);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_popcount_matches_fixture() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF, 0x03];
        assert_eq!(count_set_bits(&bytes), 34);
    }

    #[test]
    fn bitmap_popcount_whole_words_only() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0];
        assert_eq!(count_set_bits(&bytes), 32);
    }
}
