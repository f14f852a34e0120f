//! Whole-file advisory locking, giving single-writer/multi-reader
//! semantics across processes.
//!
//! Every public mutating call on `Store` holds a write guard for its
//! whole duration; every reading call holds a read guard. Acquisition
//! blocks with no timeout. A blocked caller simply waits; there is no
//! cancellation or deadline support.

use std::fs::File;

use fs2::FileExt;

use crate::error::Result;

/// Held for the duration of a read-only operation. Any number of
/// readers may hold this concurrently, but not while a writer holds
/// `WriteGuard`.
pub(crate) struct ReadGuard<'a> {
    file: &'a File,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Held for the duration of a mutating operation. At most one process
/// holds this at a time, system-wide.
pub(crate) struct WriteGuard<'a> {
    file: &'a File,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) fn lock_read(file: &File) -> Result<ReadGuard<'_>> {
    file.lock_shared()?;
    Ok(ReadGuard { file })
}

pub(crate) fn lock_write(file: &File) -> Result<WriteGuard<'_>> {
    file.lock_exclusive()?;
    Ok(WriteGuard { file })
}
