use crate::core::{Block, Transaction};
use data_encoding::HEXLOWER;
use std::collections::HashSet;
use std::sync::RwLock;

/// Valid but unconfirmed transactions, in admission order. The order is
/// load-bearing: it is the order used when composing the next candidate
/// block. Mutated from the manager thread only; the miner works on a
/// snapshot.
pub struct PendingPool {
    inner: RwLock<PoolInner>,
}

struct PoolInner {
    ordered: Vec<Transaction>,
    ids: HashSet<Vec<u8>>,
}

impl Default for PendingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingPool {
    pub fn new() -> PendingPool {
        PendingPool {
            inner: RwLock::new(PoolInner {
                ordered: Vec::new(),
                ids: HashSet::new(),
            }),
        }
    }

    /// Admit a transaction. Duplicates (by identity) are ignored.
    pub fn admit(&self, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                let id = tx.id();
                if pool.ids.insert(id) {
                    pool.ordered.push(tx);
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }

    pub fn contains(&self, txid: &[u8]) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.ids.contains(txid),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                false
            }
        }
    }

    /// Snapshot in admission order, for candidate-block composition.
    pub fn snapshot(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.ordered.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                Vec::new()
            }
        }
    }

    /// Discard exactly the transactions included in `block`, no more.
    pub fn purge_included(&self, block: &Block) {
        let included: HashSet<Vec<u8>> =
            block.get_transactions().iter().map(|tx| tx.id()).collect();
        if included.is_empty() {
            return;
        }

        match self.inner.write() {
            Ok(mut pool) => {
                pool.ordered.retain(|tx| !included.contains(&tx.id()));
                for id in &included {
                    if pool.ids.remove(id) {
                        log::debug!("Purged confirmed transaction {}", HEXLOWER.encode(id));
                    }
                }
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.ordered.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on pending pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.ordered.clear();
                pool.ids.clear();
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on pending pool");
            }
        }
    }
}
