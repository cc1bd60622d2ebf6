//! Client for the library management API.
//!
//! [`library::Library`] bundles the two resource clients, books and borrows,
//! over one HTTP transport and one [`cache::QueryCache`]. Reads go through
//! the cache; writes invalidate the tags they affect.

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod query;

pub use error::{ApiError, ApiResult};
pub use library::Library;
