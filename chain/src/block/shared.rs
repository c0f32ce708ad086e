//! A block pool that can be shared between threads.
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use powchain_common::block::pool::{self, BlockPool, BlockReader, ImportResult};
use powchain_common::block::record::BlockRecord;
use powchain_common::block::time::Clock;
use powchain_common::block::{BlockHash, BlockHeader};

/// An error from a shared block pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pool returned an error.
    #[error(transparent)]
    Pool(#[from] pool::Error),
    /// Another thread panicked while holding the pool lock.
    #[error("block pool lock is poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// A handle to a block pool guarded by a mutex. Cloning the handle shares the pool.
///
/// Every method takes the lock exactly once, so each call is atomic with respect to
/// other handles.
#[derive(Debug)]
pub struct Shared<P> {
    pool: Arc<Mutex<P>>,
}

impl<P> Clone for Shared<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<P: BlockPool> Shared<P> {
    /// Share a block pool.
    pub fn new(pool: P) -> Self {
        Self {
            pool: Arc::new(Mutex::new(pool)),
        }
    }

    /// Run a function with exclusive access to the pool.
    pub fn with<T>(&self, f: impl FnOnce(&mut P) -> T) -> Result<T, Error> {
        let mut pool = self.pool.lock()?;

        Ok(f(&mut pool))
    }

    /// Receive a block header. See [`BlockPool::receive_block`].
    pub fn receive_block<C: Clock>(
        &self,
        header: BlockHeader,
        clock: &C,
    ) -> Result<ImportResult, Error> {
        let result = self.pool.lock()?.receive_block(header, clock)?;

        Ok(result)
    }

    /// Filter an inventory announcement. See [`pool::BlockReader::receive_inventory`].
    pub fn receive_inventory(&self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>, Error> {
        Ok(self.pool.lock()?.receive_inventory(hashes))
    }

    /// Check whether a block header is known.
    pub fn block_exists(&self, hash: &BlockHash) -> Result<bool, Error> {
        Ok(self.pool.lock()?.block_exists(hash))
    }

    /// Get the tip of the best chain.
    pub fn best_branch(&self) -> Result<BlockRecord, Error> {
        Ok(self.pool.lock()?.get_best_branch().clone())
    }

    /// Find the common ancestor of two blocks.
    pub fn common_ancestor(&self, a: &BlockHash, b: &BlockHash) -> Result<BlockRecord, Error> {
        let pool = self.pool.lock()?;
        let ancestor = pool.get_common_ancestor(a, b)?.clone();

        Ok(ancestor)
    }

    /// Get the current chain tips.
    pub fn tips(&self) -> Result<Vec<BlockHash>, Error> {
        Ok(self.pool.lock()?.tips().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use powchain_common::block::time::LocalTime;
    use powchain_common::network::Network;
    use powchain_test::block::gen;

    use crate::block::pool::{BlockCache, Config};

    fn regtest() -> BlockCache {
        BlockCache::new(Config {
            network: Network::Regtest,
            ..Config::default()
        })
    }

    #[test]
    fn test_shared_across_threads() {
        let mut rng = fastrand::Rng::with_seed(1);
        let pool = regtest();
        let genesis = *pool.genesis().header().unwrap();
        let chain = gen::headers(&genesis, 32, &mut rng);
        let tip = chain.last().unwrap().block_hash();
        let clock = LocalTime::from_block_time(chain.last().unwrap().time);
        let shared = Shared::new(pool);

        let handles = chain
            .chunks(8)
            .map(|chunk| {
                let shared = shared.clone();
                let chunk = chunk.to_vec();

                thread::spawn(move || {
                    for header in chunk {
                        shared.receive_block(header, &clock).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.tips().unwrap(), vec![tip]);
        assert_eq!(shared.best_branch().unwrap().height(), Ok(32));
        assert!(shared.block_exists(&tip).unwrap());
        assert_eq!(
            shared
                .common_ancestor(&tip, &genesis.block_hash())
                .unwrap()
                .identity_hash(),
            Ok(genesis.block_hash())
        );
        assert_eq!(shared.with(|pool| pool.len()).unwrap(), 33);
    }

    #[test]
    fn test_poisoned() {
        let shared = Shared::new(regtest());
        let other = shared.clone();

        thread::spawn(move || {
            other
                .with(|pool| {
                    if pool.len() > 0 {
                        panic!("panicking while holding the lock");
                    }
                })
                .ok();
        })
        .join()
        .ok();

        assert_eq!(shared.tips(), Err(Error::Poisoned));
        assert_eq!(shared.receive_inventory(&[]), Err(Error::Poisoned));
    }
}
