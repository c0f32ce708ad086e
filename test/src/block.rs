use once_cell::sync::Lazy;
use quickcheck::{Arbitrary, Gen};

pub use powchain_common::block::*;
use powchain_common::network::Network;

pub mod pool {
    pub mod model;
}

/// Solve a block's proof of work puzzle.
pub fn solve(header: &mut BlockHeader) {
    let target = compact::decode(header.bits);
    while hash_to_target(&header.block_hash()) > target {
        header.nonce = header.nonce.wrapping_add(1);
    }
}

/// A chain of 64 blocks on top of the regtest genesis block.
pub static REGTEST_CHAIN: Lazy<Vec<BlockHeader>> = Lazy::new(|| {
    let mut rng = fastrand::Rng::with_seed(64);
    gen::headers(&Network::Regtest.genesis(), 64, &mut rng)
});

pub mod gen {
    use powchain_common::bitcoin_hashes::Hash as _;

    use super::*;

    /// Target block spacing (10 minutes).
    pub const TARGET_SPACING: BlockTime = 60 * 10;

    /// Generate a random merkle root.
    pub fn merkle_root(rng: &mut fastrand::Rng) -> TxMerkleNode {
        let mut bytes = [0; 32];
        for byte in bytes.iter_mut() {
            *byte = rng.u8(..);
        }
        TxMerkleNode::from_inner(bytes)
    }

    /// Generate a solved header on top of a parent, with the given time and target.
    pub fn header_with(
        parent: &BlockHeader,
        time: BlockTime,
        bits: Bits,
        rng: &mut fastrand::Rng,
    ) -> BlockHeader {
        let mut header = BlockHeader {
            version: 1,
            prev_blockhash: parent.block_hash(),
            merkle_root: merkle_root(rng),
            time,
            bits,
            nonce: rng.u32(..),
        };
        super::solve(&mut header);

        header
    }

    /// Generate a random header on top of a parent, with the parent's target.
    pub fn header(parent: &BlockHeader, rng: &mut fastrand::Rng) -> BlockHeader {
        let delta = rng.u32(TARGET_SPACING - 60..TARGET_SPACING + 60);

        header_with(parent, parent.time + delta, parent.bits, rng)
    }

    /// Generate a random header chain on top of a parent. The parent isn't included.
    pub fn headers(
        parent: &BlockHeader,
        length: usize,
        rng: &mut fastrand::Rng,
    ) -> Vec<BlockHeader> {
        let mut chain = Vec::with_capacity(length);
        let mut prev = *parent;

        for _ in 0..length {
            let header = header(&prev, rng);
            prev = header;

            chain.push(header);
        }
        chain
    }

    /// Generate a header chain with fixed block spacing and target.
    pub fn headers_with(
        parent: &BlockHeader,
        length: usize,
        spacing: BlockTime,
        bits: Bits,
        rng: &mut fastrand::Rng,
    ) -> Vec<BlockHeader> {
        let mut chain = Vec::with_capacity(length);
        let mut prev = *parent;

        for _ in 0..length {
            let header = header_with(&prev, prev.time + spacing, bits, rng);
            prev = header;

            chain.push(header);
        }
        chain
    }

    /// Generate a random block tree rooted at the given block. Every header builds on
    /// the root or on a previously generated header. The root isn't included.
    pub fn tree(root: &BlockHeader, size: usize, rng: &mut fastrand::Rng) -> Vec<BlockHeader> {
        let mut tree: Vec<BlockHeader> = Vec::with_capacity(size);

        for _ in 0..size {
            // Favor the most recent headers, so that the tree grows long branches.
            let parent = match rng.usize(..=tree.len()) {
                0 => *root,
                i => tree[tree.len() - rng.usize(..i.min(4)) - 1],
            };
            tree.push(header(&parent, rng));
        }
        tree
    }

    /// Generate a random minimum-difficulty genesis block header.
    pub fn genesis(rng: &mut fastrand::Rng) -> BlockHeader {
        let mut header = BlockHeader {
            version: 1,
            prev_blockhash: genesis_marker(),
            merkle_root: merkle_root(rng),
            time: rng.u32(1_231_006_505..1_600_000_000),
            bits: 0x207fffff,
            nonce: 0,
        };
        super::solve(&mut header);

        header
    }
}

/// A random block tree on top of the regtest genesis block, in random order.
#[derive(Debug, Clone)]
pub struct ArbitraryTree {
    /// The tree's blocks, shuffled.
    pub headers: Vec<BlockHeader>,
    /// Seed the tree was generated from.
    pub seed: u64,
}

impl Arbitrary for ArbitraryTree {
    fn arbitrary(g: &mut Gen) -> Self {
        let seed = u64::arbitrary(g);
        let size = usize::arbitrary(g) % g.size().clamp(1, 64) + 1;
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut headers = gen::tree(&Network::Regtest.genesis(), size, &mut rng);

        rng.shuffle(&mut headers);

        Self { headers, seed }
    }
}
