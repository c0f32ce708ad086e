//! Block and blockchain related functionality.
pub mod pool;
pub mod shared;

pub use powchain_common::block::pool::*;
pub use powchain_common::block::record::{BlockRecord, Status};
pub use powchain_common::block::{BlockHash, BlockHeader};
