//! Public API: file lifecycle, locking discipline, and superblock
//! refresh around the table and pager layers.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use log::{debug, info};

use crate::error::Result;
use crate::lock;
use crate::pager::Pager;
use crate::table::{Cursor, Table};
use crate::StoreConfig;

/// A single-file embedded key-value store.
///
/// Opening, storing, fetching, deleting, and iterating all take the
/// appropriate whole-file advisory lock and refresh the superblock
/// before touching the table, so a handle always observes a consistent
/// snapshot of whatever the last lock-holding writer committed, whether
/// in this process or another.
///
/// Not safe to share across threads without external synchronization:
/// a handle has no internal locking of its own, only the cross-process
/// file lock (see the crate-level concurrency notes).
pub struct Store {
    lock_file: File,
    pager: Pager,
    table: Table,
    config: StoreConfig,
    cursor: Cursor,
}

impl Store {
    /// Opens (creating if absent) the store named `name`, backed by a
    /// single file `{name}.idx` in the current working directory.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with_config(name, StoreConfig::default())
    }

    /// As `open`, but with a non-default block size / bucket count /
    /// frame pool size. Only meaningful for a store being created for
    /// the first time. Opening an existing file with a different
    /// config than it was created under produces a store that
    /// misinterprets its own layout.
    pub fn open_with_config(name: &str, config: StoreConfig) -> Result<Self> {
        let path = format!("{name}.idx");
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let lock_file = file.try_clone()?;

        // Zero-fill the header region under the write lock so that two
        // processes racing to create the same store don't observe a
        // partially initialized file; whichever arrives second simply
        // finds the length already non-zero and skips the fill.
        {
            let _guard = lock::lock_write(&lock_file)?;
            if file.metadata()?.len() == 0 {
                let mut init = &file;
                init.seek(SeekFrom::Start(0))?;
                init.write_all(&vec![0u8; config.header_size()])?;
                init.flush()?;
            }
        }

        let pager = Pager::open(file, &config)?;
        let table = Table::new(config);
        let cursor = Cursor::rewound(&config);

        info!("opened store {path}");
        Ok(Store { lock_file, pager, table, config, cursor })
    }

    /// Inserts or updates `key`. An update whose new value fits within
    /// the existing record's capacity is rewritten in place at the same
    /// offset; one that doesn't fit is deleted and reinserted, which may
    /// relocate it to a different offset and bucket position.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = lock::lock_write(&self.lock_file)?;
        self.pager.refresh_superblock()?;

        match self.table.find(&mut self.pager, key)? {
            None => {
                self.table.insert(&mut self.pager, key, value)?;
            }
            Some(rec_off) => {
                let (_, data_len) = self.table.record_sizes(&mut self.pager, rec_off)?;
                if value.len() as u32 <= data_len {
                    self.table.update_in_place(&mut self.pager, rec_off, key, value)?;
                } else {
                    self.table.delete(&mut self.pager, key)?;
                    self.table.insert(&mut self.pager, key, value)?;
                }
            }
        }

        self.table.commit(&mut self.pager)?;
        debug!("stored key of {} bytes, value of {} bytes", key.len(), value.len());
        Ok(())
    }

    /// Looks up `key`. Returns `None` on a miss rather than an error,
    /// since a miss is a normal outcome, not a failure.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let _guard = lock::lock_read(&self.lock_file)?;
        self.pager.refresh_superblock()?;

        match self.table.find(&mut self.pager, key)? {
            Some(rec_off) => Ok(Some(self.table.fetch(&mut self.pager, rec_off)?)),
            None => Ok(None),
        }
    }

    /// Removes `key` if present. Returns whether it was found; a miss
    /// is not an error.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let _guard = lock::lock_write(&self.lock_file)?;
        self.pager.refresh_superblock()?;

        let found = self.table.delete(&mut self.pager, key)?;
        self.table.commit(&mut self.pager)?;
        debug!("deleted key of {} bytes (found={found})", key.len());
        Ok(found)
    }

    /// Resets the iteration cursor. Does not itself take a lock or
    /// touch the file.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::rewound(&self.config);
    }

    /// Advances the iteration cursor and returns the next live key, or
    /// `None` once the bucket table is exhausted. Each call is its own
    /// locked, superblock-refreshed critical section. Iteration is not
    /// an atomic snapshot, so concurrent mutation by another process can
    /// be interleaved into the sequence of keys observed.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let _guard = lock::lock_read(&self.lock_file)?;
        self.pager.refresh_superblock()?;
        self.cursor.next(&self.table, &mut self.pager)
    }

    /// Consumes the handle, releasing the file. Equivalent to dropping
    /// it, except it lets the caller observe a close-time I/O error.
    /// Never flushes: any dirty frames must already have been committed
    /// by the mutating operation that produced them.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}
