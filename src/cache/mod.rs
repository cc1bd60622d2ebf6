//! Request-keyed query cache with tag-based invalidation.
//!
//! This module is independent of the library API:
//! - Caches any serializable payload under a hashed query key
//! - Shares one in-flight request between concurrent readers of a key
//! - Indexes entries by tag; a successful write invalidates its tags
//! - Broadcasts invalidations so mounted queries can re-fetch

mod layer;
mod storage;
mod traits;

pub use layer::{CacheEvent, QueryCache};
pub use storage::{CacheEntry, MemoryStorage, TagIndex};
pub use traits::{CacheResult, CacheSource, Cacheable, QueryKey, QueryStatus, Tag};
