//! In-memory block pool.
//!
//! *Handles block import, chain fitting, difficulty checks and tip tracking.*
//!
#![warn(missing_docs)]


use std::collections::{HashMap, HashSet, VecDeque};

use powchain_common::block::branch::Branch;
use powchain_common::block::pool::{BlockPool, BlockReader, Error, ImportResult, Selection};
use powchain_common::block::record::BlockRecord;
use powchain_common::block::time::Clock;
use powchain_common::block::{compact, genesis_marker, BlockHash, BlockHeader, Target};
use powchain_common::network::{Network, Params};

/// Block pool configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Network whose consensus parameters the pool enforces.
    pub network: Network,
    /// Best chain selection policy.
    pub selection: Selection,
}

/// An implementation of [`BlockPool`] that keeps everything in memory.
/// Most of the functionality is accessible via the traits.
///
/// Records are owned by a single map, keyed by block hash. Parent and child links are
/// hashes into that map.
#[derive(Debug, Clone)]
pub struct BlockCache {
    blocks: HashMap<BlockHash, BlockRecord>,
    tips: HashSet<BlockHash>,
    branches: HashMap<BlockHash, Branch>,
    genesis: BlockHash,
    params: Params,
    selection: Selection,
}

impl BlockCache {
    /// Create a new `BlockCache` for one of the known networks.
    pub fn new(config: Config) -> Self {
        Self::from(config.network.params(), config.selection).unwrap_or_else(|err| {
            panic!(
                "BlockCache::new: invalid {} parameters: {}",
                config.network.as_str(),
                err
            )
        })
    }

    /// Create a new `BlockCache` from consensus parameters, holding only the genesis block.
    pub fn from(params: Params, selection: Selection) -> Result<Self, Error> {
        params.validate()?;

        let genesis = BlockRecord::new(params.genesis);
        let hash = genesis.identity_hash()?;

        if !genesis.is_genesis() {
            return Err(Error::GenesisMismatch(hash));
        }
        genesis.validate_standalone()?;
        genesis.resolve(None)?;

        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);

        Ok(Self {
            blocks,
            tips: HashSet::from([hash]),
            branches: HashMap::new(),
            genesis: hash,
            params,
            selection,
        })
    }

    /// Difficulty target required of the child of the given block.
    ///
    /// # Panics
    ///
    /// Panics if the retarget window of a resolved block is incomplete.
    ///
    fn required_difficulty(&self, parent: &BlockRecord) -> Result<Target, Error> {
        match self.next_required_difficulty(parent) {
            Err(Error::Inconsistency(err)) => {
                panic!("BlockCache::required_difficulty: {}", err)
            }
            result => result,
        }
    }

    /// Check a block against its parent, and resolve its height if it checks out. The
    /// parent must be resolved.
    fn connect(&self, parent: &BlockRecord, record: &BlockRecord) -> Result<(), Error> {
        let expected = compact::round(&self.required_difficulty(parent)?);
        let actual = record.claimed_difficulty()?;

        if actual != expected {
            return Err(Error::BadDifficulty {
                hash: record.identity_hash()?,
                expected,
                actual,
            });
        }
        record.resolve(Some(parent))?;

        Ok(())
    }

    /// Resolve the descendants of a block that was just resolved. Descendants that fail
    /// their difficulty check are pruned, and returned.
    fn connect_descendants(&mut self, root: BlockHash) -> Vec<(BlockHash, Error)> {
        let mut rejected = Vec::new();
        let mut queue = VecDeque::from([root]);

        while let Some(hash) = queue.pop_front() {
            let children = match self.blocks.get(&hash) {
                Some(record) => record.children().cloned().collect::<Vec<_>>(),
                None => continue,
            };

            for child in children {
                let result = match (self.blocks.get(&hash), self.blocks.get(&child)) {
                    (Some(parent), Some(record)) => self.connect(parent, record),
                    _ => continue,
                };

                match result {
                    Ok(()) => queue.push_back(child),
                    Err(err) => {
                        log::warn!("Pruning block {} and its descendants: {}", child, err);

                        self.prune(&child);
                        rejected.push((child, err));
                    }
                }
            }
        }
        rejected
    }

    /// Remove a block and all its descendants from the pool.
    fn prune(&mut self, hash: &BlockHash) {
        let parent = self.blocks.get(hash).and_then(|r| r.parent());
        let mut stack = vec![*hash];

        while let Some(h) = stack.pop() {
            if let Some(record) = self.blocks.remove(&h) {
                stack.extend(record.children().cloned());
            }
            self.tips.remove(&h);
            self.branches.remove(&h);
        }

        if let Some(parent) = parent {
            self.detach(&parent, hash);
        }
    }

    /// Remove a child from its parent. A parent left without children becomes a tip,
    /// unless it's a placeholder, in which case it's removed.
    fn detach(&mut self, parent: &BlockHash, child: &BlockHash) {
        let placeholder = match self.blocks.get_mut(parent) {
            Some(record) => {
                record.remove_child(child);

                if record.has_children() {
                    return;
                }
                record.is_placeholder()
            }
            None => return,
        };

        if placeholder {
            log::trace!("Removing placeholder {}", parent);
            self.blocks.remove(parent);
        } else {
            self.tips.insert(*parent);
        }
    }

    /// Insert or replace a record without checking it. Children of a replaced record
    /// are kept, and a missing parent gets a placeholder.
    fn insert(&mut self, hash: BlockHash, mut record: BlockRecord) -> Option<BlockRecord> {
        let prev = record
            .parent()
            .or_else(|| record.previous_hash().ok())
            .filter(|prev| *prev != genesis_marker());

        if let Some(existing) = self.blocks.get(&hash) {
            for child in existing.children() {
                record.add_child(*child);
            }
        }
        if let Some(prev) = prev {
            if !self.blocks.contains_key(&prev) {
                log::trace!("Creating placeholder for missing block {}", prev);

                let placeholder = self.create_placeholder(prev);
                self.blocks.insert(prev, placeholder);
            }
            if let Some(parent) = self.blocks.get_mut(&prev) {
                parent.add_child(hash);
                self.tips.remove(&prev);
            }
        }

        if record.is_placeholder() || record.has_children() {
            self.tips.remove(&hash);
        } else {
            self.tips.insert(hash);
        }
        self.blocks.insert(hash, record)
    }

    /// Resolve the height of a record whose parent's ancestry is known. Returns whether
    /// the record ends up resolved.
    fn try_resolve(&self, record: &BlockRecord) -> bool {
        if record.height().is_ok() {
            return true;
        }
        let parent = match self.parent_of(record) {
            Some(parent) if parent.height().is_ok() => parent,
            _ => return false,
        };
        match record.resolve(Some(parent)) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("Failed to resolve block {:?}: {}", record.key(), err);
                false
            }
        }
    }

    /// Find the placeholder at the root of a block's chain, if any.
    fn root_placeholder(&self, hash: &BlockHash) -> Option<BlockHash> {
        let mut current = self.blocks.get(hash)?;

        while let Some(parent) = self.parent_of(current) {
            current = parent;
        }
        if current.is_placeholder() {
            current.key()
        } else {
            None
        }
    }
}

impl BlockReader for BlockCache {
    fn get_block(&self, hash: &BlockHash) -> Option<&BlockRecord> {
        self.blocks.get(hash)
    }

    fn block_exists(&self, hash: &BlockHash) -> bool {
        self.blocks
            .get(hash)
            .map_or(false, |record| !record.is_placeholder())
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn tips<'a>(&'a self) -> Box<dyn Iterator<Item = &BlockHash> + 'a> {
        Box::new(self.tips.iter())
    }

    fn is_tip(&self, hash: &BlockHash) -> bool {
        self.tips.contains(hash)
    }

    fn missing<'a>(&'a self) -> Box<dyn Iterator<Item = &BlockHash> + 'a> {
        Box::new(
            self.blocks
                .iter()
                .filter(|(_, record)| record.is_placeholder())
                .map(|(hash, _)| hash),
        )
    }

    fn genesis(&self) -> &BlockRecord {
        self.blocks
            .get(&self.genesis)
            .expect("BlockCache::genesis: the genesis block is always present")
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn branch(&self, tip: &BlockHash) -> Option<&Branch> {
        self.branches.get(tip)
    }
}

impl BlockPool for BlockCache {
    fn receive_block<C: Clock>(
        &mut self,
        header: BlockHeader,
        clock: &C,
    ) -> Result<ImportResult, Error> {
        // Validate that the block's proof-of-work (1) is valid against its difficulty
        // target, and (2) is within the network's limits. These checks are cheap and
        // don't need the block's ancestry.
        let candidate = BlockRecord::new(header);
        candidate.validate_standalone()?;
        candidate.validate_against_network(&self.params, clock)?;

        let hash = candidate.identity_hash()?;
        let prev = header.prev_blockhash;

        let mut record = match self.blocks.get(&hash) {
            Some(existing) if !existing.is_placeholder() => {
                log::trace!("Duplicate block {}", hash);
                return Ok(ImportResult::Duplicate(hash));
            }
            Some(placeholder) => {
                log::trace!("Attaching header to placeholder {}", hash);

                let mut record = placeholder.clone();
                record.update_from_header(header)?;
                record
            }
            None => candidate,
        };
        // The genesis block is always present, so this is another block claiming to be one.
        if prev == genesis_marker() {
            return Err(Error::GenesisMismatch(hash));
        }
        record.link(prev)?;

        // If the parent's ancestry is known, the block is checked right away, before
        // anything is modified.
        if let Some(parent) = self.blocks.get(&prev) {
            if parent.height().is_ok() {
                self.connect(parent, &record)?;
            }
        }

        let extends_tip = self.tips.contains(&prev);
        let height = record.height().ok();

        self.insert(hash, record);

        if extends_tip {
            if let Some(branch) = self.branches.remove(&prev) {
                if self.tips.contains(&hash) {
                    self.branches.insert(hash, branch);
                } else {
                    log::debug!("Dropping branch state of {}: no longer a tip", prev);
                }
            }
        }

        let rejected = if height.is_some() {
            self.connect_descendants(hash)
        } else {
            Vec::new()
        };
        let missing = self.root_placeholder(&hash);

        match height {
            Some(height) => log::debug!("Imported block {} at height {}", hash, height),
            None => log::debug!(
                "Imported block {} with unknown ancestry (missing {:?})",
                hash,
                missing
            ),
        }

        Ok(ImportResult::Imported {
            hash,
            height,
            missing,
            rejected,
        })
    }

    fn put_block(&mut self, hash: BlockHash, record: BlockRecord) -> Option<BlockRecord> {
        let previous = self.insert(hash, record);
        let resolved = match self.blocks.get(&hash) {
            Some(record) => self.try_resolve(record),
            None => false,
        };

        if resolved {
            for (child, err) in self.connect_descendants(hash) {
                log::debug!("Rejected block {} while connecting {}: {}", child, hash, err);
            }
        }
        previous
    }

    fn branch_mut(&mut self, tip: &BlockHash) -> Option<&mut Branch> {
        if !self.tips.contains(tip) {
            return None;
        }
        Some(self.branches.entry(*tip).or_default())
    }

    fn take_branch(&mut self, tip: &BlockHash) -> Option<Branch> {
        self.branches.remove(tip)
    }
}
