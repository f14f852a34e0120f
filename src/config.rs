//! Store configuration.
//!
//! Block size, bucket count, and frame pool size are kept as runtime
//! fields rather than constants so tests can shrink the frame pool or
//! bucket table, but a store opened with one configuration is only
//! layout-compatible with an index file created under the same
//! configuration, since there is no on-disk tag recording which values
//! were used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Size in bytes of one pager block, including the superblock.
    pub block_size: usize,
    /// Number of hash buckets in the table.
    pub buckets_max: u32,
    /// Number of non-superblock frames kept resident at once.
    pub frame_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            block_size: 4096,
            buckets_max: 1024,
            frame_pool_size: 4096 / 16,
        }
    }
}

impl StoreConfig {
    /// Offset of the freelist head pointer: right after the superblock.
    pub(crate) fn freelist_off(&self) -> u64 {
        self.block_size as u64
    }

    /// Offset of the first bucket head in the bucket table.
    pub(crate) fn hashtab_off(&self) -> u64 {
        self.freelist_off() + 4
    }

    /// Offset at which the variable-length record region begins.
    pub(crate) fn record_off(&self) -> u64 {
        self.hashtab_off() + 4 * self.buckets_max as u64
    }

    /// Total size of the fixed header region (superblock + freelist head
    /// + bucket table) that is zero-filled when a store is created.
    pub(crate) fn header_size(&self) -> usize {
        self.record_off() as usize
    }
}
