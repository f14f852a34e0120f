//! `kvhash`, an embedded, single-file hash key-value store.
//!
//! A [`Store`] owns one `.idx` file containing a fixed-size superblock,
//! a freelist head, a bucket hash table, and a variable-length record
//! region. Concurrent processes opening the same file coordinate through
//! whole-file advisory locks; within a handle, a small LRU frame pool
//! caches recently touched blocks and a per-block timestamp table lets
//! a handle detect and reload blocks another process changed underneath
//! it.
//!
//! ```no_run
//! use kvhash::Store;
//!
//! # fn main() -> kvhash::Result<()> {
//! let mut store = Store::open("example")?;
//! store.put(b"language", b"rust")?;
//! assert_eq!(store.get(b"language")?, Some(b"rust".to_vec()));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod lock;
mod pager;
mod store;
mod table;

pub use config::StoreConfig;
pub use error::{DbError, Result};
pub use store::Store;

/// Crate version, exposed for diagnostics (e.g. the `kvctl` binary's
/// startup banner).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
