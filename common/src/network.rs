//! Proof-of-work networks and their consensus parameters.
use std::str::FromStr;

use bitcoin::blockdata::constants;
use thiserror::Error;

use crate::block::time::MAX_FUTURE_BLOCK_TIME;
use crate::block::{BlockHash, BlockHeader, BlockTime, Height, Target};

/// Peer network.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Network {
    /// Bitcoin Mainnet.
    #[default]
    Mainnet,
    /// Bitcoin Testnet.
    Testnet,
    /// Bitcoin regression test net.
    Regtest,
}

impl From<Network> for bitcoin::Network {
    fn from(value: Network) -> Self {
        match value {
            Network::Mainnet => Self::Bitcoin,
            Network::Testnet => Self::Testnet,
            Network::Regtest => Self::Regtest,
        }
    }
}

/// An unknown network name was given.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown network `{0}`")]
pub struct UnknownNetwork(String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(UnknownNetwork(other.to_owned())),
        }
    }
}

impl Network {
    /// Return the short string representation of this network.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }

    /// Get the genesis block header.
    ///
    /// ```
    /// use powchain_common::network::Network;
    ///
    /// let network = Network::Mainnet;
    /// let genesis = network.genesis();
    ///
    /// assert_eq!(network.genesis_hash(), genesis.block_hash());
    /// ```
    pub fn genesis(&self) -> BlockHeader {
        constants::genesis_block((*self).into()).header
    }

    /// Get the hash of the genesis block of this network.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis().block_hash()
    }

    /// Get the consensus parameters for this network.
    pub fn params(&self) -> Params {
        Params::new(*self)
    }
}

/// Consensus parameters that would make retargeting divide by zero.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidParams {
    /// The retarget interval is zero.
    #[error("retarget interval must be > 0")]
    RetargetInterval,
    /// The timespan clamp factor is zero.
    #[error("timespan clamp must be > 0")]
    TimespanClamp,
    /// The target timespan is shorter than the clamp factor.
    #[error("target timespan {0} is shorter than the clamp factor {1}")]
    TargetTimespan(BlockTime, BlockTime),
}

/// Consensus parameters consulted by block validation and difficulty retargeting.
///
/// These are plain values: a pool holds its own copy, and tests are free to build
/// parameters for networks that don't exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    /// Network these parameters belong to.
    pub network: Network,
    /// Number of blocks between difficulty retargets.
    pub retarget_interval: Height,
    /// Expected time, in seconds, for a whole retarget interval to be mined.
    pub target_timespan: BlockTime,
    /// The observed timespan is clamped to within this factor of the target timespan.
    pub timespan_clamp: BlockTime,
    /// The easiest target a block may claim, ie. the proof-of-work limit.
    pub max_difficulty: Target,
    /// How far ahead of network time a block timestamp may be.
    pub max_future_skew: BlockTime,
    /// Genesis block header.
    pub genesis: BlockHeader,
    /// Don't retarget difficulty, ever.
    pub no_retargeting: bool,
}

impl Params {
    /// Create parameters for one of the known networks.
    pub fn new(network: Network) -> Self {
        let consensus = bitcoin::consensus::params::Params::new(network.into());

        Self {
            network,
            retarget_interval: consensus.difficulty_adjustment_interval(),
            target_timespan: consensus.pow_target_timespan as BlockTime,
            timespan_clamp: 4,
            max_difficulty: consensus.pow_limit,
            max_future_skew: MAX_FUTURE_BLOCK_TIME,
            genesis: network.genesis(),
            no_retargeting: consensus.no_pow_retargeting,
        }
    }

    /// Hash of the genesis block.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis.block_hash()
    }

    /// Shortest observed timespan taken into account when retargeting.
    pub fn min_timespan(&self) -> BlockTime {
        self.target_timespan / self.timespan_clamp
    }

    /// Longest observed timespan taken into account when retargeting.
    pub fn max_timespan(&self) -> BlockTime {
        self.target_timespan.saturating_mul(self.timespan_clamp)
    }

    /// Check that retargeting is well-defined with these parameters.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        if self.retarget_interval == 0 {
            return Err(InvalidParams::RetargetInterval);
        }
        if self.timespan_clamp == 0 {
            return Err(InvalidParams::TimespanClamp);
        }
        if self.target_timespan < self.timespan_clamp {
            return Err(InvalidParams::TargetTimespan(
                self.target_timespan,
                self.timespan_clamp,
            ));
        }
        Ok(())
    }

    /// Use a different retarget interval.
    ///
    /// # Panics
    ///
    /// Panics if the interval is zero.
    pub fn with_retarget_interval(self, retarget_interval: Height) -> Self {
        assert!(
            retarget_interval > 0,
            "Params::with_retarget_interval: interval must be > 0"
        );
        Self {
            retarget_interval,
            ..self
        }
    }

    /// Use a different target timespan.
    ///
    /// # Panics
    ///
    /// Panics if the timespan is shorter than the clamp factor.
    pub fn with_target_timespan(self, target_timespan: BlockTime) -> Self {
        assert!(
            target_timespan >= self.timespan_clamp,
            "Params::with_target_timespan: timespan must be >= {}",
            self.timespan_clamp
        );
        Self {
            target_timespan,
            ..self
        }
    }

    /// Use a different proof-of-work limit.
    pub fn with_max_difficulty(self, max_difficulty: Target) -> Self {
        Self {
            max_difficulty,
            ..self
        }
    }

    /// Use a different genesis block.
    pub fn with_genesis(self, genesis: BlockHeader) -> Self {
        Self { genesis, ..self }
    }

    /// Turn difficulty retargeting on or off.
    pub fn with_retargeting(self, enabled: bool) -> Self {
        Self {
            no_retargeting: !enabled,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{compact, genesis_marker};

    #[test]
    fn test_params() {
        let params = Network::Mainnet.params();

        assert_eq!(params.retarget_interval, 2016);
        assert_eq!(params.target_timespan, 14 * 24 * 60 * 60);
        assert_eq!(params.min_timespan(), 302400);
        assert_eq!(params.max_timespan(), 4838400);
        assert_eq!(compact::encode(&params.max_difficulty), 0x1d00ffff);
        assert!(!params.no_retargeting);
        assert!(Network::Regtest.params().no_retargeting);
    }

    #[test]
    fn test_genesis() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let params = network.params();

            assert_eq!(params.genesis.prev_blockhash, genesis_marker());
            assert_eq!(params.genesis_hash(), network.genesis_hash());
            assert!(compact::decode(params.genesis.bits) <= params.max_difficulty);
        }
    }

    #[test]
    fn test_validate() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            assert_eq!(network.params().validate(), Ok(()));
        }
        let params = Network::Mainnet.params();

        assert_eq!(
            Params {
                retarget_interval: 0,
                ..params.clone()
            }
            .validate(),
            Err(InvalidParams::RetargetInterval)
        );
        assert_eq!(
            Params {
                timespan_clamp: 0,
                ..params.clone()
            }
            .validate(),
            Err(InvalidParams::TimespanClamp)
        );
        assert_eq!(
            Params {
                target_timespan: 0,
                ..params
            }
            .validate(),
            Err(InvalidParams::TargetTimespan(0, 4))
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("regtest".parse::<Network>(), Ok(Network::Regtest));
        assert_eq!(Network::Testnet.as_str().parse(), Ok(Network::Testnet));
        assert!("signet".parse::<Network>().is_err());
    }
}
