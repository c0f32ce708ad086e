//! Block-related types and functions.
pub mod branch;
pub mod compact;
pub mod pool;
pub mod record;
pub mod retarget;
pub mod time;

use bitcoin::util::uint::Uint256;
use bitcoin_hashes::Hash as _;

pub use bitcoin::blockdata::block::BlockHeader;
pub use bitcoin::hash_types::{BlockHash, TxMerkleNode, Txid};

/// Difficulty target of a block.
pub type Target = Uint256;

/// Block work.
pub type Work = Uint256;

/// Compact difficulty bits (target) of a block.
pub type Bits = u32;

/// Height of a block.
pub type Height = u64;

/// Block time (seconds since Epoch).
pub type BlockTime = u32;

/// The previous-block hash carried by a genesis block.
///
/// ```
/// use powchain_common::block;
/// use powchain_common::network::Network;
///
/// assert_eq!(Network::Mainnet.genesis().prev_blockhash, block::genesis_marker());
/// ```
pub fn genesis_marker() -> BlockHash {
    BlockHash::all_zeros()
}

/// Interpret a block hash as a little-endian 256-bit number, so that it can be
/// compared against a difficulty target.
pub fn hash_to_target(hash: &BlockHash) -> Target {
    let bytes = hash.into_inner();
    let mut words = [0u64; 4];

    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *word = u64::from_le_bytes(buf);
    }
    Uint256(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin_hashes::hex::FromHex;

    #[test]
    fn test_hash_to_target() {
        // Block #1 of the Bitcoin main chain.
        let hash =
            BlockHash::from_hex("00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048")
                .unwrap();
        let target = hash_to_target(&hash);

        assert_eq!(target.0[3], 0x00000000839a8e68);
        assert_eq!(target.0[0], 0x20161bbf18eb6048);
        assert!(target < compact::decode(0x1d00ffff));
    }

    #[test]
    fn test_genesis_marker() {
        assert_eq!(hash_to_target(&genesis_marker()), Target::default());
    }
}
