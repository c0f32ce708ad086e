//! Powchain is the consensus core of a proof-of-work node: it accepts block headers in
//! any order, links them into chains, checks their proof-of-work and difficulty, and
//! keeps track of the chain tips.
//!
//! The project is broken down into the following crates:
//!
//! * [`chain`]: the in-memory block pool, and a handle to share it between threads
//! * [`common`]: block records, difficulty arithmetic and network parameters
//!
//! The [`chain`] crate's `BlockCache` is a good place to start, to see how everything
//! fits together.

#[cfg(feature = "powchain-chain")]
pub use powchain_chain as chain;
#[cfg(feature = "powchain-common")]
pub use powchain_common as common;

#[cfg(test)]
pub use powchain_test as test;
