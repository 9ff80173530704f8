//! # Request Store
//!
//! File-backed persistence for request records. See [`file_store`] for the on-disk layout.

pub mod errors;
pub mod file_store;

pub use errors::{StoreError, StoreResult};
pub use file_store::FileRequestStore;
