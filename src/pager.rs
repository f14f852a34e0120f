//! Paged block cache over the index file.
//!
//! The pager is the lowest layer: it exposes byte-range `read`/`write`
//! over a single file, buffered through a fixed pool of LRU-ordered
//! frames, and uses a per-block `(seconds, counter)` timestamp stored in
//! a dedicated superblock frame to detect when another process has
//! mutated a block this handle has cached.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use log::trace;

use crate::error::Result;
use crate::StoreConfig;

/// Bytes per superblock timestamp slot: a `(seconds, counter)` pair of u32s.
const TIMESTAMP_SLOT_SIZE: usize = 8;

/// A block's last-observed write time. Ordered lexicographically by
/// `(seconds, counter)`: a frame is stale when its timestamp is
/// strictly less than the superblock's recorded timestamp for that
/// block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Timestamp {
    pub seconds: u32,
    pub counter: u32,
}

impl Timestamp {
    fn read_from(buf: &[u8], block_idx: u32) -> Self {
        let off = block_idx as usize * TIMESTAMP_SLOT_SIZE;
        let seconds = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let counter = u32::from_le_bytes(buf[off + 4..off + 8].try_into().unwrap());
        Timestamp { seconds, counter }
    }

    fn write_into(self, buf: &mut [u8], block_idx: u32) {
        let off = block_idx as usize * TIMESTAMP_SLOT_SIZE;
        buf[off..off + 4].copy_from_slice(&self.seconds.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&self.counter.to_le_bytes());
    }

    /// A fresh timestamp derived from the previous one for the same slot.
    /// The counter breaks ties within the same wall-clock second.
    fn next(prev: Timestamp) -> Timestamp {
        let seconds = now_seconds();
        let counter = if seconds == prev.seconds { prev.counter + 1 } else { 0 };
        Timestamp { seconds, counter }
    }
}

fn now_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// An in-memory cache entry for one block of the index file.
struct Frame {
    buf: Vec<u8>,
    block_idx: Option<u32>,
    timestamp: Timestamp,
    dirty: bool,
}

impl Frame {
    fn new(block_size: usize) -> Self {
        Frame {
            buf: vec![0u8; block_size],
            block_idx: None,
            timestamp: Timestamp::default(),
            dirty: false,
        }
    }
}

/// The LRU-ordered pool of non-superblock frames.
struct FramePool {
    frames: Vec<Frame>,
    /// Positions into `frames`, front = least recently used, back = most
    /// recently used.
    order: VecDeque<usize>,
    /// block index -> position in `frames`, for resident blocks only.
    resident: HashMap<u32, usize>,
}

impl FramePool {
    fn new(capacity: usize, block_size: usize) -> Self {
        let frames = (0..capacity).map(|_| Frame::new(block_size)).collect();
        let order = (0..capacity).collect();
        FramePool { frames, order, resident: HashMap::new() }
    }

    /// Moves `pos` to the most-recently-used end, inserting it if absent.
    fn touch_mru(&mut self, pos: usize) {
        if let Some(i) = self.order.iter().position(|&p| p == pos) {
            self.order.remove(i);
        }
        self.order.push_back(pos);
    }

    fn lru_candidate(&self) -> usize {
        *self.order.front().expect("frame pool is never empty")
    }
}

/// Byte-range cache over the index file.
pub(crate) struct Pager {
    file: File,
    block_size: usize,
    superblock: Frame,
    pool: FramePool,
}

impl Pager {
    /// Opens the pager over `file`, whose header region is assumed to
    /// already be initialized (zero-filled on first creation). Loads the
    /// superblock into its dedicated, always-resident frame.
    pub(crate) fn open(mut file: File, config: &StoreConfig) -> Result<Self> {
        let mut superblock = Frame::new(config.block_size);
        superblock.block_idx = Some(0);
        read_block_raw(&mut file, 0, config.block_size, &mut superblock.buf)?;

        Ok(Pager {
            file,
            block_size: config.block_size,
            superblock,
            pool: FramePool::new(config.frame_pool_size, config.block_size),
        })
    }

    pub(crate) fn file_len(&mut self) -> Result<u64> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }

    /// Appends `len` zeroed bytes to the file, bypassing the block cache,
    /// and returns the file offset at which they start. The caller is
    /// expected to immediately `write` real content over this span.
    pub(crate) fn extend(&mut self, len: usize) -> Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&vec![0u8; len])?;
        Ok(offset)
    }

    pub(crate) fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    pub(crate) fn read_into(&mut self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let block_size = self.block_size;
        let len = dst.len();
        if len == 0 {
            return Ok(());
        }
        let idx_start = offset / block_size as u64;
        let idx_end = (offset + len as u64 - 1) / block_size as u64;

        let mut written = 0usize;
        for idx in idx_start..=idx_end {
            let pos = self.prepare_block(idx as u32)?;
            let block_left = idx * block_size as u64;
            let block_start = offset.saturating_sub(block_left) as usize;
            let remaining = len - written;
            let avail = block_size - block_start;
            let take = remaining.min(avail);

            dst[written..written + take]
                .copy_from_slice(&self.pool.frames[pos].buf[block_start..block_start + take]);
            written += take;
        }
        Ok(())
    }

    pub(crate) fn write(&mut self, offset: u64, src: &[u8]) -> Result<()> {
        let block_size = self.block_size;
        let len = src.len();
        if len == 0 {
            return Ok(());
        }
        let idx_start = offset / block_size as u64;
        let idx_end = (offset + len as u64 - 1) / block_size as u64;

        let mut written = 0usize;
        for idx in idx_start..=idx_end {
            let pos = self.prepare_block(idx as u32)?;
            let block_left = idx * block_size as u64;
            let block_start = offset.saturating_sub(block_left) as usize;
            let remaining = len - written;
            let avail = block_size - block_start;
            let take = remaining.min(avail);

            let frame = &mut self.pool.frames[pos];
            frame.buf[block_start..block_start + take].copy_from_slice(&src[written..written + take]);
            frame.dirty = true;
            written += take;
        }
        Ok(())
    }

    /// Ensures block `idx` is resident and up to date, promotes it to
    /// MRU, and returns its position in the pool.
    fn prepare_block(&mut self, idx: u32) -> Result<usize> {
        if let Some(&pos) = self.pool.resident.get(&idx) {
            if self.is_stale(pos) {
                self.reload(pos, idx)?;
            }
            self.pool.touch_mru(pos);
            return Ok(pos);
        }

        let pos = self.pool.lru_candidate();
        if self.pool.frames[pos].dirty {
            self.commit_pool_frame(pos)?;
        }
        if let Some(old_idx) = self.pool.frames[pos].block_idx {
            self.pool.resident.remove(&old_idx);
        }
        self.reload(pos, idx)?;
        self.pool.resident.insert(idx, pos);
        self.pool.touch_mru(pos);
        Ok(pos)
    }

    fn is_stale(&self, pos: usize) -> bool {
        let frame = &self.pool.frames[pos];
        let block_idx = frame.block_idx.expect("resident frame has a block index");
        let current = Timestamp::read_from(&self.superblock.buf, block_idx);
        frame.timestamp < current
    }

    fn reload(&mut self, pos: usize, idx: u32) -> Result<()> {
        trace!("loading block {idx} into frame {pos}");
        let block_size = self.block_size;
        let frame = &mut self.pool.frames[pos];
        frame.buf.iter_mut().for_each(|b| *b = 0);
        read_block_raw(&mut self.file, idx, block_size, &mut frame.buf)?;
        frame.block_idx = Some(idx);
        frame.dirty = false;
        frame.timestamp = Timestamp::read_from(&self.superblock.buf, idx);
        Ok(())
    }

    fn commit_pool_frame(&mut self, pos: usize) -> Result<()> {
        let block_idx = self.pool.frames[pos].block_idx.expect("committing a resident frame");
        let ts = Timestamp::next(self.pool.frames[pos].timestamp);
        ts.write_into(&mut self.superblock.buf, block_idx);
        write_block_raw(&mut self.file, block_idx, self.block_size, &self.pool.frames[pos].buf)?;

        let frame = &mut self.pool.frames[pos];
        frame.dirty = false;
        frame.timestamp = ts;
        Ok(())
    }

    fn commit_superblock(&mut self) -> Result<()> {
        let ts = Timestamp::next(self.superblock.timestamp);
        ts.write_into(&mut self.superblock.buf, 0);
        write_block_raw(&mut self.file, 0, self.block_size, &self.superblock.buf)?;
        self.superblock.dirty = false;
        self.superblock.timestamp = ts;
        Ok(())
    }

    /// Commits every dirty frame, then the superblock itself. Used at the
    /// end of every mutating table operation.
    pub(crate) fn commit_all(&mut self) -> Result<()> {
        let dirty: Vec<usize> = self
            .pool
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.dirty)
            .map(|(pos, _)| pos)
            .collect();
        for pos in dirty {
            self.commit_pool_frame(pos)?;
        }
        self.commit_superblock()
    }

    /// Reloads the superblock's timestamp table from disk, so this
    /// handle observes writes committed by other processes since it last
    /// checked.
    pub(crate) fn refresh_superblock(&mut self) -> Result<()> {
        read_block_raw(&mut self.file, 0, self.block_size, &mut self.superblock.buf)?;
        Ok(())
    }
}

fn read_block_raw(file: &mut File, block_idx: u32, block_size: usize, buf: &mut [u8]) -> Result<()> {
    let offset = block_idx as u64 * block_size as u64;
    let file_len = file.seek(SeekFrom::End(0))?;
    let to_read = (file_len.saturating_sub(offset) as usize).min(block_size);

    buf.iter_mut().for_each(|b| *b = 0);
    if to_read > 0 {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..to_read])?;
    }
    Ok(())
}

fn write_block_raw(file: &mut File, block_idx: u32, block_size: usize, buf: &[u8]) -> Result<()> {
    let offset = block_idx as u64 * block_size as u64;
    let file_len = file.seek(SeekFrom::End(0))?;
    let to_write = (file_len.saturating_sub(offset) as usize).min(block_size);

    if to_write > 0 {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf[..to_write])?;
    }
    Ok(())
}
