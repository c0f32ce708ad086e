//! In-memory block pool, and a handle to share it between threads.
#![allow(clippy::len_without_is_empty)]
#![deny(unsafe_code, missing_debug_implementations)]
pub mod block;

pub use block::pool::{BlockCache, Config};
pub use block::shared::Shared;
