//! Library of common proof-of-work chain functionality shared by all crates.
#![warn(missing_docs)]
pub mod block;
pub mod network;

pub use bitcoin;
pub use bitcoin_hashes;
