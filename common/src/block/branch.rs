//! Per-branch auxiliary state.
//!
//! A block pool keeps one [`Branch`] per chain tip that the transaction pool has attached
//! state to. The block pool only moves these along as tips are extended, and drops them
//! when their tip is pruned; it never looks inside.
use std::collections::BTreeSet;

use super::Txid;

/// Transactions associated with a candidate chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    /// Transactions waiting to be included on this branch.
    pending: BTreeSet<Txid>,
    /// Transactions that are still missing some of their inputs on this branch.
    incomplete: BTreeSet<Txid>,
}

impl Branch {
    /// Create an empty branch state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending transaction. Returns `false` if it was already pending.
    pub fn add_pending(&mut self, txid: Txid) -> bool {
        self.incomplete.remove(&txid);
        self.pending.insert(txid)
    }

    /// Add an incomplete transaction. Returns `false` if it was already known.
    pub fn add_incomplete(&mut self, txid: Txid) -> bool {
        if self.pending.contains(&txid) {
            return false;
        }
        self.incomplete.insert(txid)
    }

    /// Mark an incomplete transaction as complete, making it pending.
    pub fn complete(&mut self, txid: &Txid) -> bool {
        if self.incomplete.remove(txid) {
            self.pending.insert(*txid);
            return true;
        }
        false
    }

    /// Forget a transaction.
    pub fn remove(&mut self, txid: &Txid) -> bool {
        self.pending.remove(txid) | self.incomplete.remove(txid)
    }

    /// Check whether a transaction is known on this branch.
    pub fn contains(&self, txid: &Txid) -> bool {
        self.pending.contains(txid) || self.incomplete.contains(txid)
    }

    /// Pending transactions.
    pub fn pending(&self) -> impl Iterator<Item = &Txid> + '_ {
        self.pending.iter()
    }

    /// Incomplete transactions.
    pub fn incomplete(&self) -> impl Iterator<Item = &Txid> + '_ {
        self.incomplete.iter()
    }

    /// Number of transactions on this branch.
    pub fn len(&self) -> usize {
        self.pending.len() + self.incomplete.len()
    }

    /// Check whether there are no transactions on this branch.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.incomplete.is_empty()
    }

    /// Move all transactions from another branch into this one.
    pub fn merge(&mut self, other: Branch) {
        for txid in other.incomplete {
            self.add_incomplete(txid);
        }
        for txid in other.pending {
            self.add_pending(txid);
        }
    }
}
