//! Cache-aside layer over a key/value blob store
//!
//! The store only knows bytes, creation times and expiry. The fetcher adds
//! the stale-while-revalidate protocols on top.
//!
//! # Entry States
//!
//! | State | `get_created_at` | Fetch on subscribe |
//! |-------|------------------|--------------------|
//! | Miss | `None` | always |
//! | Cached | `Some(t)` | when `should_refetch(t)` |
//! | Expired | `None` | always |

pub mod fetcher;
pub mod store;

pub use fetcher::{CacheAsideFetcher, FetchUpdates, Signal};
pub use store::{BlobStore, CacheEntry, FileBlobStore, MemoryBlobStore};
