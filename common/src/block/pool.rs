//! Block pool traits and types.
//!
//! A block pool holds every block header it was given, whether or not the block connects
//! to the genesis block yet. Blocks are linked into chains as their parents arrive, and
//! the set of chain tips is kept up to date.
use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;

use super::branch::Branch;
use super::record::BlockRecord;
use super::retarget::{self, Inconsistency};
use super::time::Clock;
use super::{hash_to_target, BlockHash, BlockHeader, BlockTime, Height, Target};
use crate::network::{InvalidParams, Params};

/// A block pool error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The block hash doesn't meet the block's own difficulty target.
    #[error("block {0} has invalid proof-of-work")]
    NoProofOfWork(BlockHash),

    /// The block's difficulty target is easier than the network allows.
    #[error("block target {0} is easier than the proof-of-work limit {1}")]
    TooEasy(Target, Target),

    /// The block timestamp is too far in the future.
    #[error("block timestamp {0} is past the limit of {1}")]
    Prescient(BlockTime, BlockTime),

    /// The block claims a difficulty target different from the one required.
    #[error("block {hash} has target {actual}, expected {expected}")]
    BadDifficulty {
        /// The offending block.
        hash: BlockHash,
        /// Target required by the retarget rule.
        expected: Target,
        /// Target claimed by the block.
        actual: Target,
    },

    /// The block was linked to a parent other than the one its header names.
    #[error("block {hash} is linked to {linked}, but claims {claimed} as its parent")]
    InconsistentParent {
        /// The offending block.
        hash: BlockHash,
        /// Parent the block is already linked to.
        linked: BlockHash,
        /// Parent named by the block header.
        claimed: BlockHash,
    },

    /// A header doesn't hash to the identity its record has or expects.
    #[error("header hashes to {actual}, expected {expected}")]
    IdentityMismatch {
        /// Identity of the record.
        expected: BlockHash,
        /// Hash of the header.
        actual: BlockHash,
    },

    /// The block has no parent, but isn't this network's genesis block.
    #[error("block {0} has no parent, and isn't the genesis block")]
    GenesisMismatch(BlockHash),

    /// The operation needs a block header, but the record is a placeholder.
    #[error("block record has no header")]
    DetachedBlock,

    /// The block's ancestry doesn't reach the genesis block yet.
    #[error("ancestry of block {0} is unresolved")]
    UnresolvedAncestry(BlockHash),

    /// The two blocks have no common ancestor in the pool.
    #[error("blocks {0} and {1} are on disjoint chains")]
    DisjointChains(BlockHash, BlockHash),

    /// The block is not in the pool.
    #[error("block missing: {0}")]
    BlockMissing(BlockHash),

    /// The consensus parameters can't be used for retargeting.
    #[error("invalid consensus parameters: {0}")]
    InvalidParams(#[from] InvalidParams),

    /// The pool's bookkeeping is broken.
    #[error(transparent)]
    Inconsistency(#[from] Inconsistency),
}

impl Error {
    /// Check whether this error is caused by invalid block data, as opposed to misuse
    /// of the pool.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoProofOfWork(_)
                | Self::TooEasy(..)
                | Self::Prescient(..)
                | Self::BadDifficulty { .. }
        )
    }
}

/// The outcome of a successful block import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
    /// The block was added to the pool.
    Imported {
        /// Hash of the imported block.
        hash: BlockHash,
        /// Height of the block, if its ancestry is known.
        height: Option<Height>,
        /// If the block doesn't connect to the genesis block, the placeholder at the root
        /// of its chain, ie. the block we should ask peers for.
        missing: Option<BlockHash>,
        /// Descendants that were waiting for this block, and turned out to be invalid.
        /// They were removed from the pool, along with their own descendants.
        rejected: Vec<(BlockHash, Error)>,
    },
    /// The block was already in the pool. Nothing changed.
    Duplicate(BlockHash),
}

impl ImportResult {
    /// Hash of the block that was received.
    pub fn hash(&self) -> BlockHash {
        match self {
            Self::Imported { hash, .. } | Self::Duplicate(hash) => *hash,
        }
    }
}

/// How the best chain is chosen among the pool's tips.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The tallest chain wins.
    Height,
    /// The chain with the most cumulative proof-of-work wins.
    #[default]
    Work,
}

/// Read access to a block pool.
pub trait BlockReader {
    /// Get a block record by hash. Placeholders are included.
    fn get_block(&self, hash: &BlockHash) -> Option<&BlockRecord>;
    /// Check whether a block header is known. Placeholders don't count.
    fn block_exists(&self, hash: &BlockHash) -> bool;
    /// Number of records in the pool, placeholders included.
    fn len(&self) -> usize;
    /// Check whether the pool is empty. A pool always holds its genesis block.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Iterate over the chain tips, in no particular order.
    fn tips<'a>(&'a self) -> Box<dyn Iterator<Item = &BlockHash> + 'a>;
    /// Check whether a block is a chain tip.
    fn is_tip(&self, hash: &BlockHash) -> bool;
    /// Iterate over the blocks we know of, but don't have the header of.
    fn missing<'a>(&'a self) -> Box<dyn Iterator<Item = &BlockHash> + 'a>;
    /// The genesis block.
    fn genesis(&self) -> &BlockRecord;
    /// Consensus parameters of this pool.
    fn params(&self) -> &Params;
    /// Best chain selection policy of this pool.
    fn selection(&self) -> Selection;
    /// State of the branch ending at the given tip, if any.
    fn branch(&self, tip: &BlockHash) -> Option<&Branch>;

    /// Get the parent of a block, if it's in the pool.
    fn parent_of(&self, record: &BlockRecord) -> Option<&BlockRecord> {
        let prev = record.parent().or_else(|| record.previous_hash().ok())?;
        self.get_block(&prev)
    }

    /// Filter an inventory announcement down to the blocks we should ask for.
    ///
    /// Returns the announced hashes we have no header for, in the order they were
    /// announced, without duplicates.
    fn receive_inventory(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        let mut seen = HashSet::with_capacity(hashes.len());

        hashes
            .iter()
            .filter(|h| !self.block_exists(h) && seen.insert(**h))
            .cloned()
            .collect()
    }

    /// Find the closest block that both given blocks descend from. A block counts as its
    /// own ancestor.
    fn get_common_ancestor(&self, a: &BlockHash, b: &BlockHash) -> Result<&BlockRecord, Error> {
        let mut x = self.get_block(a).ok_or(Error::BlockMissing(*a))?;
        let mut y = self.get_block(b).ok_or(Error::BlockMissing(*b))?;
        let mut dx = depth(self, x);
        let mut dy = depth(self, y);

        // Bring both blocks to the same depth first.
        while dx > dy {
            match self.parent_of(x) {
                Some(p) => x = p,
                None => return Err(Error::DisjointChains(*a, *b)),
            }
            dx -= 1;
        }
        while dy > dx {
            match self.parent_of(y) {
                Some(p) => y = p,
                None => return Err(Error::DisjointChains(*a, *b)),
            }
            dy -= 1;
        }

        loop {
            if x.key() == y.key() {
                return Ok(x);
            }
            match (self.parent_of(x), self.parent_of(y)) {
                (Some(px), Some(py)) => {
                    x = px;
                    y = py;
                }
                _ => return Err(Error::DisjointChains(*a, *b)),
            }
        }
    }

    /// Get the tip of the best chain, according to the pool's [`Selection`] policy.
    ///
    /// Only tips that connect to the genesis block are candidates. Ties are broken in
    /// favor of the numerically lowest block hash. Returns the genesis block if there
    /// are no candidates.
    fn get_best_branch(&self) -> &BlockRecord {
        let selection = self.selection();

        self.tips()
            .filter_map(|hash| self.get_block(hash))
            .filter(|record| record.height().is_ok())
            .max_by(|a, b| compare(selection, a, b))
            .unwrap_or_else(|| self.genesis())
    }

    /// Get the difficulty target required of the block *following* the given one.
    ///
    /// The block's ancestry must be resolved. If the next block starts a new retarget
    /// window, the window ending at the given block is walked back to its first block.
    fn next_required_difficulty(&self, block: &BlockRecord) -> Result<Target, Error> {
        let params = self.params();
        let claimed = block.claimed_difficulty()?;
        let height = block.height()?;

        if params.no_retargeting || !retarget::is_retarget_height(height, params) {
            return Ok(claimed);
        }
        let hash = block.identity_hash()?;
        let mut start = block;

        for walked in 0..params.retarget_interval - 1 {
            start = match self.parent_of(start) {
                Some(parent) if !parent.is_placeholder() => parent,
                _ => {
                    return Err(Inconsistency {
                        hash,
                        height,
                        walked,
                    }
                    .into())
                }
            };
        }
        let observed = block.timestamp()?.saturating_sub(start.timestamp()?);

        Ok(retarget::retarget(&claimed, observed, params))
    }
}

/// A block pool that can be written to.
pub trait BlockPool: BlockReader {
    /// Receive a block header from a peer.
    ///
    /// The block is validated, linked to its parent and its chain's tip is updated. An
    /// invalid block leaves the pool untouched.
    fn receive_block<C: Clock>(
        &mut self,
        header: BlockHeader,
        clock: &C,
    ) -> Result<ImportResult, Error>;

    /// Insert or replace a record, keeping parent links and tips up to date. Returns the
    /// record previously stored under this hash.
    ///
    /// The children of a replaced record are carried over to the new one, since they
    /// still name it as their parent. A missing parent gets a placeholder. No checks are
    /// made on the record itself, but if its parent's ancestry is known, its height is
    /// resolved, and descendants waiting on it are connected and checked.
    fn put_block(&mut self, hash: BlockHash, record: BlockRecord) -> Option<BlockRecord>;

    /// Create a record for a block we know the hash of, but haven't received yet.
    fn create_placeholder(&self, hash: BlockHash) -> BlockRecord {
        BlockRecord::placeholder(hash)
    }

    /// Get the branch state of a tip, creating it if necessary. Returns `None` if the
    /// given block isn't a tip.
    fn branch_mut(&mut self, tip: &BlockHash) -> Option<&mut Branch>;

    /// Remove and return the branch state of a tip.
    fn take_branch(&mut self, tip: &BlockHash) -> Option<Branch>;
}

/// Number of ancestors of a block that are in the pool, placeholders included.
fn depth<R: BlockReader + ?Sized>(reader: &R, record: &BlockRecord) -> Height {
    let mut depth = 0;
    let mut current = record;

    while let Some(parent) = reader.parent_of(current) {
        current = parent;
        depth += 1;
    }
    depth
}

/// Order two candidate tips. The greater one is preferred.
fn compare(selection: Selection, a: &BlockRecord, b: &BlockRecord) -> Ordering {
    let primary = match selection {
        Selection::Height => a.height().ok().cmp(&b.height().ok()),
        Selection::Work => a.chain_work().ok().cmp(&b.chain_work().ok()),
    };
    primary.then_with(|| {
        let a = a.key().map(|h| hash_to_target(&h));
        let b = b.key().map(|h| hash_to_target(&h));

        // Lower hashes win.
        b.cmp(&a)
    })
}
