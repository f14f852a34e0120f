//! Bucket hash table and record chains, layered over the pager's
//! byte-level read/write.
//!
//! On-disk layout of the post-superblock region (see `StoreConfig` for
//! the exact offsets):
//!
//! ```text
//! [ freelist head: u32 ][ bucket table: u32 * buckets_max ][ records... ]
//! ```
//!
//! A record is `[next_off: u32][key_len: u32][data_len: u32][key][data]`.

use crate::error::{DbError, Result};
use crate::pager::Pager;
use crate::StoreConfig;

const RECORD_HEADER_LEN: usize = 12;

/// A record's fixed-size header, as stored on disk.
#[derive(Debug, Clone, Copy)]
struct Record {
    next_off: u32,
    key_len: u32,
    data_len: u32,
}

impl Record {
    /// The record's capacity: the payload size at creation time, which
    /// never shrinks even if a later in-place update reduces `data_len`.
    fn capacity(&self) -> u32 {
        self.key_len + self.data_len
    }
}

/// FNV-1a, 32-bit.
fn hash_key(key: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in key {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

pub(crate) struct Table {
    config: StoreConfig,
}

impl Table {
    pub(crate) fn new(config: StoreConfig) -> Self {
        Table { config }
    }

    fn bucket_offset(&self, key: &[u8]) -> u64 {
        let bucket = hash_key(key) % self.config.buckets_max;
        self.config.hashtab_off() + bucket as u64 * 4
    }

    fn read_u32(&self, pager: &mut Pager, off: u64) -> Result<u32> {
        let buf = pager.read(off, 4)?;
        Ok(u32::from_le_bytes(buf.try_into().unwrap()))
    }

    fn write_u32(&self, pager: &mut Pager, off: u64, value: u32) -> Result<()> {
        pager.write(off, &value.to_le_bytes())
    }

    fn read_record(&self, pager: &mut Pager, rec_off: u64) -> Result<Record> {
        let buf = pager.read(rec_off, RECORD_HEADER_LEN)?;
        Ok(Record {
            next_off: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            key_len: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            data_len: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        })
    }

    fn read_key(&self, pager: &mut Pager, rec_off: u64, key_len: u32) -> Result<Vec<u8>> {
        pager.read(rec_off + RECORD_HEADER_LEN as u64, key_len as usize)
    }

    fn read_value(&self, pager: &mut Pager, rec_off: u64, key_len: u32, data_len: u32) -> Result<Vec<u8>> {
        pager.read(rec_off + RECORD_HEADER_LEN as u64 + key_len as u64, data_len as usize)
    }

    /// Writes a full record (header + key + data) at `rec_off`. The
    /// physical slot must already be at least `key.len() + data.len()`
    /// bytes of payload capacity.
    fn write_record(&self, pager: &mut Pager, rec_off: u64, next_off: u32, key: &[u8], data: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + key.len() + data.len());
        buf.extend_from_slice(&next_off.to_le_bytes());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(key);
        buf.extend_from_slice(data);
        pager.write(rec_off, &buf)
    }

    /// Finds the first freelist record with `capacity >= need`, unlinks
    /// it, and returns its offset. If none fits, extends the file with a
    /// fresh slot sized exactly for `need`. First-fit, no splitting, no
    /// coalescing: a reused slot's capacity is whatever it was first
    /// created with.
    fn get_free(&self, pager: &mut Pager, need: u32) -> Result<u64> {
        let freelist_off = self.config.freelist_off();
        let mut prev_off = freelist_off;
        let mut cur = self.read_u32(pager, freelist_off)?;

        while cur != 0 {
            let rec = self.read_record(pager, cur as u64)?;
            if rec.capacity() >= need {
                self.write_u32(pager, prev_off, rec.next_off)?;
                return Ok(cur as u64);
            }
            prev_off = cur as u64;
            cur = rec.next_off;
        }

        let slot_len = RECORD_HEADER_LEN + need as usize;
        pager.extend(slot_len)
    }

    /// Always head-inserts a fresh record into `key`'s bucket chain.
    /// Update-in-place semantics live one layer up, in `Store::put`.
    pub(crate) fn insert(&self, pager: &mut Pager, key: &[u8], data: &[u8]) -> Result<u64> {
        let need: u32 = (key.len() + data.len())
            .try_into()
            .map_err(|_| DbError::Alloc(format!("record of {} bytes exceeds u32 capacity", key.len() + data.len())))?;

        let chain_off = self.bucket_offset(key);
        let head = self.read_u32(pager, chain_off)?;

        let rec_off = self.get_free(pager, need)?;
        self.write_u32(pager, chain_off, rec_off as u32)?;
        self.write_record(pager, rec_off, head, key, data)?;
        Ok(rec_off)
    }

    /// Walks `key`'s bucket chain; returns the record offset, or `None`
    /// on miss.
    pub(crate) fn find(&self, pager: &mut Pager, key: &[u8]) -> Result<Option<u64>> {
        let chain_off = self.bucket_offset(key);
        let mut rec_off = self.read_u32(pager, chain_off)?;

        while rec_off != 0 {
            let rec = self.read_record(pager, rec_off as u64)?;
            if rec.key_len as usize == key.len() {
                let stored_key = self.read_key(pager, rec_off as u64, rec.key_len)?;
                if stored_key == key {
                    return Ok(Some(rec_off as u64));
                }
            }
            rec_off = rec.next_off;
        }
        Ok(None)
    }

    /// Reads the record header at `rec_off`, exposing capacity and
    /// current lengths so the facade can decide in-place update vs.
    /// delete-then-reinsert.
    pub(crate) fn record_sizes(&self, pager: &mut Pager, rec_off: u64) -> Result<(u32, u32)> {
        let rec = self.read_record(pager, rec_off)?;
        Ok((rec.key_len, rec.data_len))
    }

    pub(crate) fn fetch(&self, pager: &mut Pager, rec_off: u64) -> Result<Vec<u8>> {
        let rec = self.read_record(pager, rec_off)?;
        self.read_value(pager, rec_off, rec.key_len, rec.data_len)
    }

    /// Rewrites `data` into an existing record in place, shrinking only
    /// `data_len` (never the physical slot, and never `key_len`). The
    /// record's reported capacity for future freelist sizing checks
    /// permanently drops to the new, smaller `key_len + data_len`. This
    /// is intentional, kept for compatibility with existing index files.
    pub(crate) fn update_in_place(&self, pager: &mut Pager, rec_off: u64, key: &[u8], data: &[u8]) -> Result<()> {
        let rec = self.read_record(pager, rec_off)?;
        self.write_record(pager, rec_off, rec.next_off, key, data)
    }

    /// Unlinks `key`'s record from its bucket chain and threads it onto
    /// the freelist head. Returns `false` if the key was not found.
    pub(crate) fn delete(&self, pager: &mut Pager, key: &[u8]) -> Result<bool> {
        let chain_off = self.bucket_offset(key);
        let mut prev_off = chain_off;
        let mut cur = self.read_u32(pager, chain_off)?;

        while cur != 0 {
            let rec = self.read_record(pager, cur as u64)?;
            let is_match = rec.key_len as usize == key.len() && {
                let stored_key = self.read_key(pager, cur as u64, rec.key_len)?;
                stored_key == key
            };

            if is_match {
                self.write_u32(pager, prev_off, rec.next_off)?;

                let freelist_off = self.config.freelist_off();
                let old_head = self.read_u32(pager, freelist_off)?;
                self.write_u32(pager, cur as u64, old_head)?;
                self.write_u32(pager, freelist_off, cur)?;
                return Ok(true);
            }

            prev_off = cur as u64;
            cur = rec.next_off;
        }
        Ok(false)
    }

    pub(crate) fn commit(&self, pager: &mut Pager) -> Result<()> {
        pager.commit_all()
    }
}

/// Forward-scan iteration cursor. Not an atomic snapshot: insertions at
/// the head of a not-yet-visited bucket are observed, insertions at the
/// head of the currently-visited bucket are not. Iteration order is
/// otherwise undefined.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    bucket_off: u64,
    rec_off: u64,
}

impl Cursor {
    pub(crate) fn rewound(config: &StoreConfig) -> Self {
        Cursor { bucket_off: config.freelist_off(), rec_off: 0 }
    }

    pub(crate) fn next(&mut self, table: &Table, pager: &mut Pager) -> Result<Option<Vec<u8>>> {
        let record_off = table.config.record_off();

        if self.rec_off == 0 {
            while self.rec_off == 0 && self.bucket_off < record_off {
                self.bucket_off += 4;
                self.rec_off = table.read_u32(pager, self.bucket_off)? as u64;
            }
        }

        if self.bucket_off >= record_off {
            return Ok(None);
        }

        let rec = table.read_record(pager, self.rec_off)?;
        let key = table.read_key(pager, self.rec_off, rec.key_len)?;
        self.rec_off = rec.next_off as u64;
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use std::fs::OpenOptions;

    fn open_table(dir: &tempfile::TempDir) -> (Table, Pager, StoreConfig) {
        let config = StoreConfig::default();
        let path = dir.path().join("t.idx");
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
        let mut pager = Pager::open(file, &config).unwrap();
        pager.extend(config.header_size()).unwrap();
        (Table::new(config), pager, config)
    }

    #[test]
    fn hash_is_fnv1a() {
        // FNV-1a("") == the offset basis.
        assert_eq!(hash_key(b""), 2166136261);
        // Known FNV-1a-32 vector for "a".
        assert_eq!(hash_key(b"a"), 0xe40c292c);
    }

    #[test]
    fn insert_then_find_then_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, _) = open_table(&dir);

        table.insert(&mut pager, b"dog", b"dog data").unwrap();
        let off = table.find(&mut pager, b"dog").unwrap().unwrap();
        assert_eq!(table.fetch(&mut pager, off).unwrap(), b"dog data");
        assert!(table.find(&mut pager, b"cat").unwrap().is_none());
    }

    #[test]
    fn delete_removes_from_chain_and_moves_to_freelist() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, config) = open_table(&dir);

        table.insert(&mut pager, b"dog", b"dog data").unwrap();
        assert!(table.delete(&mut pager, b"dog").unwrap());
        assert!(table.find(&mut pager, b"dog").unwrap().is_none());
        assert!(!table.delete(&mut pager, b"dog").unwrap());

        let freelist_head = table.read_u32(&mut pager, config.freelist_off()).unwrap();
        assert_ne!(freelist_head, 0);
    }

    #[test]
    fn freelist_reuse_does_not_extend_file() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, _) = open_table(&dir);

        table.insert(&mut pager, b"k1", b"1234567").unwrap();
        table.commit(&mut pager).unwrap();
        let len_before = pager.file_len().unwrap();

        table.delete(&mut pager, b"k1").unwrap();
        table.commit(&mut pager).unwrap();

        table.insert(&mut pager, b"k2", b"abcdefg").unwrap();
        table.commit(&mut pager).unwrap();
        let len_after = pager.file_len().unwrap();

        assert_eq!(len_before, len_after);
    }

    #[test]
    fn shrinking_update_in_place_keeps_the_same_record_offset() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, _) = open_table(&dir);

        let off = table.insert(&mut pager, b"k", b"xxxx").unwrap();
        table.update_in_place(&mut pager, off, b"k", b"yy").unwrap();

        let found = table.find(&mut pager, b"k").unwrap().unwrap();
        assert_eq!(found, off);
        assert_eq!(table.fetch(&mut pager, found).unwrap(), b"yy");
    }

    #[test]
    fn growing_update_via_delete_then_insert_relocates_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, _) = open_table(&dir);

        let off = table.insert(&mut pager, b"k", b"xxxx").unwrap();
        table.update_in_place(&mut pager, off, b"k", b"yy").unwrap();

        table.delete(&mut pager, b"k").unwrap();
        let new_off = table.insert(&mut pager, b"k", b"zzzzzzzz").unwrap();

        assert_ne!(new_off, off);
        let found = table.find(&mut pager, b"k").unwrap().unwrap();
        assert_eq!(found, new_off);
        assert_eq!(table.fetch(&mut pager, found).unwrap(), b"zzzzzzzz");
    }

    #[test]
    fn iteration_visits_every_live_key_once() {
        let dir = tempfile::tempdir().unwrap();
        let (table, mut pager, config) = open_table(&dir);

        table.insert(&mut pager, b"a", b"1").unwrap();
        table.insert(&mut pager, b"b", b"2").unwrap();
        table.insert(&mut pager, b"c", b"3").unwrap();
        table.delete(&mut pager, b"b").unwrap();

        let mut cursor = Cursor::rewound(&config);
        let mut seen = Vec::new();
        while let Some(key) = cursor.next(&table, &mut pager).unwrap() {
            seen.push(key);
        }
        seen.sort();
        assert_eq!(seen, vec![b"a".to_vec(), b"c".to_vec()]);
    }
}
