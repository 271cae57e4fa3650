use crate::core::Transaction;
use crate::utils::sha256_digest;
use once_cell::sync::Lazy;

/// Root digest of an empty transaction list.
pub static EMPTY_TRX_ROOT: Lazy<Vec<u8>> = Lazy::new(|| sha256_digest(&[]));

/// Merkle-style digest over an ordered transaction list
///
/// Leaves are transaction ids; each level pairs neighbours with
/// SHA256(left || right), duplicating a trailing odd node. The root is the
/// `trx_trie_root` committed in the block header.
pub struct MerkleTree {
    levels: Vec<Vec<Vec<u8>>>,
}

impl MerkleTree {
    pub fn from_hashes(leaf_hashes: Vec<Vec<u8>>) -> MerkleTree {
        if leaf_hashes.is_empty() {
            return MerkleTree {
                levels: vec![vec![EMPTY_TRX_ROOT.clone()]],
            };
        }

        let mut levels = vec![leaf_hashes];
        while levels
            .last()
            .map(|level| level.len() > 1)
            .unwrap_or(false)
        {
            let current = levels.last().expect("levels is never empty here");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut combined = Vec::with_capacity(left.len() + right.len());
                combined.extend_from_slice(left);
                combined.extend_from_slice(right);
                next.push(sha256_digest(combined.as_slice()));
            }
            levels.push(next);
        }

        MerkleTree { levels }
    }

    pub fn root(&self) -> Vec<u8> {
        self.levels
            .last()
            .and_then(|level| level.first())
            .cloned()
            .unwrap_or_else(|| EMPTY_TRX_ROOT.clone())
    }
}

/// Digest of an ordered transaction list, as committed in block headers.
pub fn transactions_root(transactions: &[Transaction]) -> Vec<u8> {
    let leaf_hashes: Vec<Vec<u8>> = transactions.iter().map(|tx| tx.id()).collect();
    MerkleTree::from_hashes(leaf_hashes).root()
}
