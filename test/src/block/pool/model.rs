//! Block pool *model*.
//! Not for production use.
//!
//! Stores headers and nothing else: everything is recomputed from scratch on every
//! query, which makes the model slow but obviously correct. Performs no validation.
use std::collections::{BTreeSet, HashMap};

use powchain_common::block::pool::Selection;
use powchain_common::block::{
    compact, genesis_marker, hash_to_target, BlockHash, BlockHeader, Height, Work,
};

#[derive(Debug, Clone)]
pub struct Model {
    pub headers: HashMap<BlockHash, BlockHeader>,
    pub genesis: BlockHash,
}

impl Model {
    pub fn new(genesis: BlockHeader) -> Self {
        let hash = genesis.block_hash();
        let mut headers = HashMap::new();

        headers.insert(hash, genesis);

        Self {
            headers,
            genesis: hash,
        }
    }

    /// Import a header. Returns `false` if it was already known.
    pub fn import(&mut self, header: BlockHeader) -> bool {
        self.headers.insert(header.block_hash(), header).is_none()
    }

    /// Number of blocks, including the ones we only know the hash of.
    pub fn len(&self) -> usize {
        self.headers.len() + self.missing().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks that no known block builds on.
    pub fn tips(&self) -> BTreeSet<BlockHash> {
        let parents = self
            .headers
            .values()
            .map(|h| h.prev_blockhash)
            .collect::<BTreeSet<_>>();

        self.headers
            .keys()
            .filter(|h| !parents.contains(*h))
            .cloned()
            .collect()
    }

    /// Blocks that are built on, but that we don't have.
    pub fn missing(&self) -> BTreeSet<BlockHash> {
        self.headers
            .values()
            .map(|h| h.prev_blockhash)
            .filter(|h| *h != genesis_marker() && !self.headers.contains_key(h))
            .collect()
    }

    /// The chain ending at the given block, from genesis, if it connects.
    pub fn chain(&self, hash: &BlockHash) -> Option<Vec<BlockHeader>> {
        let mut chain = Vec::new();
        let mut hash = *hash;

        while let Some(header) = self.headers.get(&hash) {
            chain.push(*header);
            hash = header.prev_blockhash;
        }
        chain.reverse();

        match chain.first() {
            Some(root) if root.block_hash() == self.genesis => Some(chain),
            _ => None,
        }
    }

    pub fn height(&self, hash: &BlockHash) -> Option<Height> {
        self.chain(hash).map(|c| c.len() as Height - 1)
    }

    pub fn chain_work(&self, hash: &BlockHash) -> Option<Work> {
        self.chain(hash).map(|chain| {
            chain.iter().fold(Work::default(), |acc, h| {
                acc + compact::work(&compact::decode(h.bits))
            })
        })
    }

    /// The best tip according to the given policy, or genesis if no tip connects.
    pub fn best(&self, selection: Selection) -> BlockHash {
        self.tips()
            .into_iter()
            .filter_map(|tip| {
                let score = match selection {
                    Selection::Height => Work::from_u64(self.height(&tip)?)?,
                    Selection::Work => self.chain_work(&tip)?,
                };
                Some((score, tip))
            })
            .max_by(|(a, a_hash), (b, b_hash)| {
                a.cmp(b)
                    .then_with(|| hash_to_target(b_hash).cmp(&hash_to_target(a_hash)))
            })
            .map(|(_, tip)| tip)
            .unwrap_or(self.genesis)
    }
}
