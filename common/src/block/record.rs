//! Blocks, as held by a block pool.
//!
//! A [`BlockRecord`] either carries a header, or is a *placeholder* for a block that was
//! referenced as a parent before its header arrived. Records never point to each other:
//! the parent and children of a record are block hashes, resolved through the pool.
use std::collections::BTreeSet;

use bitcoin_hashes::Hash as _;
use once_cell::unsync::OnceCell;

use super::pool::Error;
use super::time::Clock;
use super::{compact, genesis_marker, hash_to_target};
use super::{Bits, BlockHash, BlockHeader, BlockTime, Height, Target, Work};
use crate::network::Params;

/// Where a record is in its lifecycle. Records only move forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// No header yet; the record holds a parent slot open for its children.
    Placeholder,
    /// The header is known and has valid proof-of-work.
    Attached,
    /// The record is linked to its parent, but its ancestry is not yet known.
    Linked,
    /// The record connects to the genesis block and passed all checks.
    Validated,
}

/// Memoized position of a record in its chain.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    height: Height,
    chain_work: Work,
}

/// A block known to the pool.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    header: Option<BlockHeader>,
    /// Hash a placeholder is waiting for.
    expected: Option<BlockHash>,
    hash: OnceCell<BlockHash>,
    resolved: OnceCell<Resolved>,
    parent: Option<BlockHash>,
    children: BTreeSet<BlockHash>,
}

impl BlockRecord {
    /// Create a record from a block header.
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header: Some(header),
            expected: None,
            hash: OnceCell::new(),
            resolved: OnceCell::new(),
            parent: None,
            children: BTreeSet::new(),
        }
    }

    /// Create a placeholder for a block we know of, but haven't seen.
    pub fn placeholder(hash: BlockHash) -> Self {
        Self {
            header: None,
            expected: Some(hash),
            hash: OnceCell::new(),
            resolved: OnceCell::new(),
            parent: None,
            children: BTreeSet::new(),
        }
    }

    /// The block header, unless this is a placeholder.
    pub fn header(&self) -> Option<&BlockHeader> {
        self.header.as_ref()
    }

    /// Check whether this record is waiting for its header.
    pub fn is_placeholder(&self) -> bool {
        self.header.is_none()
    }

    /// Where the record is in its lifecycle.
    pub fn status(&self) -> Status {
        if self.header.is_none() {
            Status::Placeholder
        } else if self.resolved.get().is_some() {
            Status::Validated
        } else if self.parent.is_some() {
            Status::Linked
        } else {
            Status::Attached
        }
    }

    /// The block hash. Computed once.
    pub fn identity_hash(&self) -> Result<BlockHash, Error> {
        let header = self.attached()?;

        Ok(*self.hash.get_or_init(|| header.block_hash()))
    }

    /// The hash this record is known by: its identity, or the hash a placeholder awaits.
    pub fn key(&self) -> Option<BlockHash> {
        self.identity_hash().ok().or(self.expected)
    }

    /// Hash of the previous block, as claimed by the header.
    pub fn previous_hash(&self) -> Result<BlockHash, Error> {
        Ok(self.attached()?.prev_blockhash)
    }

    /// Block timestamp.
    pub fn timestamp(&self) -> Result<BlockTime, Error> {
        Ok(self.attached()?.time)
    }

    /// Compact difficulty target claimed by the header.
    pub fn bits(&self) -> Result<Bits, Error> {
        Ok(self.attached()?.bits)
    }

    /// Difficulty target claimed by the header.
    pub fn claimed_difficulty(&self) -> Result<Target, Error> {
        Ok(compact::decode(self.attached()?.bits))
    }

    /// Proof-of-work of this block alone.
    pub fn work(&self) -> Result<Work, Error> {
        Ok(compact::work(&self.claimed_difficulty()?))
    }

    /// Check whether this block claims to be a genesis block.
    pub fn is_genesis(&self) -> bool {
        matches!(self.header, Some(h) if h.prev_blockhash == genesis_marker())
    }

    /// Block height. Only known once the record's ancestry is resolved.
    pub fn height(&self) -> Result<Height, Error> {
        self.resolved
            .get()
            .map(|r| r.height)
            .ok_or_else(|| Error::UnresolvedAncestry(self.key_or_marker()))
    }

    /// Total proof-of-work of the chain ending at this block.
    pub fn chain_work(&self) -> Result<Work, Error> {
        self.resolved
            .get()
            .map(|r| r.chain_work)
            .ok_or_else(|| Error::UnresolvedAncestry(self.key_or_marker()))
    }

    /// Resolve the height and chain work of this record from its parent. Genesis blocks
    /// need no parent. Once resolved, the result never changes.
    pub fn resolve(&self, parent: Option<&BlockRecord>) -> Result<Height, Error> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.height);
        }
        let header = self.attached()?;
        let work = compact::work(&compact::decode(header.bits));

        let resolved = if header.prev_blockhash == genesis_marker() {
            Resolved {
                height: 0,
                chain_work: work,
            }
        } else {
            let hash = self.identity_hash()?;
            let parent = parent.ok_or(Error::UnresolvedAncestry(header.prev_blockhash))?;
            let parent_hash = parent.key_or_marker();

            if parent_hash != header.prev_blockhash {
                return Err(Error::InconsistentParent {
                    hash,
                    linked: parent_hash,
                    claimed: header.prev_blockhash,
                });
            }
            let p = parent
                .resolved
                .get()
                .ok_or(Error::UnresolvedAncestry(parent_hash))?;

            Resolved {
                height: p.height + 1,
                chain_work: p.chain_work + work,
            }
        };
        Ok(self.resolved.get_or_init(|| resolved).height)
    }

    /// Context-free validation: the block hash must meet the block's own target.
    pub fn validate_standalone(&self) -> Result<(), Error> {
        let hash = self.identity_hash()?;
        let target = self.claimed_difficulty()?;

        if hash_to_target(&hash) > target {
            return Err(Error::NoProofOfWork(hash));
        }
        Ok(())
    }

    /// Validation against network rules: the target must not be easier than the
    /// proof-of-work limit, and the timestamp must not be too far in the future.
    pub fn validate_against_network<C: Clock>(
        &self,
        params: &Params,
        clock: &C,
    ) -> Result<(), Error> {
        let target = self.claimed_difficulty()?;
        if target > params.max_difficulty {
            return Err(Error::TooEasy(target, params.max_difficulty));
        }

        let time = self.timestamp()?;
        let limit = clock.block_time().saturating_add(params.max_future_skew);
        if time > limit {
            return Err(Error::Prescient(time, limit));
        }
        Ok(())
    }

    /// Attach or replace the header of this record.
    ///
    /// The new header must hash to the identity the record already has, or is waiting
    /// for. Memoized values are reset, unless the header is unchanged.
    pub fn update_from_header(&mut self, header: BlockHeader) -> Result<(), Error> {
        if self.header == Some(header) {
            return Ok(());
        }
        let candidate = BlockRecord::new(header);
        let actual = candidate.identity_hash()?;

        if let Some(expected) = self.key() {
            if expected != actual {
                return Err(Error::IdentityMismatch { expected, actual });
            }
        }
        candidate.validate_standalone()?;

        if let Some(linked) = self.parent {
            if linked != header.prev_blockhash {
                return Err(Error::InconsistentParent {
                    hash: actual,
                    linked,
                    claimed: header.prev_blockhash,
                });
            }
        }
        self.header = Some(header);
        self.expected = Some(actual);
        self.hash = candidate.hash;
        self.resolved = OnceCell::new();

        Ok(())
    }

    /// The parent this record is linked to, if any.
    pub fn parent(&self) -> Option<BlockHash> {
        self.parent
    }

    /// Link this record to its parent. A record's parent never changes once linked.
    pub fn link(&mut self, parent: BlockHash) -> Result<(), Error> {
        match self.parent {
            Some(linked) if linked != parent => Err(Error::InconsistentParent {
                hash: self.key_or_marker(),
                linked,
                claimed: parent,
            }),
            _ => {
                self.parent = Some(parent);
                Ok(())
            }
        }
    }

    /// Hashes of the known children of this block.
    pub fn children(&self) -> impl Iterator<Item = &BlockHash> + '_ {
        self.children.iter()
    }

    /// Check whether any children of this block are known.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Register a child. Returns `false` if it was already registered.
    pub fn add_child(&mut self, hash: BlockHash) -> bool {
        self.children.insert(hash)
    }

    /// Forget a child. Returns `false` if it wasn't registered.
    pub fn remove_child(&mut self, hash: &BlockHash) -> bool {
        self.children.remove(hash)
    }

    fn attached(&self) -> Result<&BlockHeader, Error> {
        self.header.as_ref().ok_or(Error::DetachedBlock)
    }

    fn key_or_marker(&self) -> BlockHash {
        self.key().unwrap_or_else(BlockHash::all_zeros)
    }
}
