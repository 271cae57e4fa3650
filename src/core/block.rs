use crate::core::merkle;
use crate::core::target::{compact_bits, meets_target, target_hex};
use crate::core::Transaction;
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, double_sha256_digest, serialize};
use serde::{Deserialize, Serialize};
use sled::IVec;

/// Block hashes are 32 bytes
pub const HASH_LEN: usize = 32;

/// Header version. Bumped to 2 when the canonical storage encoding moved to
/// the bincode layout; hashes of stored records depend on the encoding, so
/// the generation is committed in every header.
pub const BLOCK_VERSION: u32 = 2;

/// Byte length of the fixed mining preimage
pub const MINING_PREIMAGE_LEN: usize = 84;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockHeader {
    version: u32,
    height: u64,
    parent_hash: Vec<u8>,
    coinbase: Vec<u8>,
    timestamp: u32, // Unix seconds
    difficulty: u64,
    nonce: u32,
    total_difficulty: u128,
    state_root: Vec<u8>,
    trx_trie_root: Vec<u8>,
}

impl BlockHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u64,
        parent_hash: Vec<u8>,
        coinbase: Vec<u8>,
        timestamp: u32,
        difficulty: u64,
        state_root: Vec<u8>,
        trx_trie_root: Vec<u8>,
    ) -> Result<BlockHeader> {
        if parent_hash.len() != HASH_LEN {
            return Err(NodeError::InvalidBlock(format!(
                "Parent hash must be {HASH_LEN} bytes, got {}",
                parent_hash.len()
            )));
        }

        Ok(BlockHeader {
            version: BLOCK_VERSION,
            height,
            parent_hash,
            coinbase,
            timestamp,
            difficulty,
            nonce: 0,
            total_difficulty: 0,
            state_root,
            trx_trie_root,
        })
    }

    /// The fixed 84-byte preimage hashed during mining, big-endian
    /// throughout:
    ///
    /// | offset | size | field         |
    /// |--------|------|---------------|
    /// | 0      | 4    | version       |
    /// | 4      | 32   | parent hash   |
    /// | 36     | 32   | trx trie root |
    /// | 68     | 4    | time          |
    /// | 72     | 8    | difficulty    |
    /// | 80     | 4    | nonce         |
    pub fn mining_preimage(&self, nonce: u32) -> [u8; MINING_PREIMAGE_LEN] {
        let mut preimage = [0u8; MINING_PREIMAGE_LEN];
        preimage[0..4].copy_from_slice(&self.version.to_be_bytes());

        // Decoded headers are not guaranteed well-formed; short hashes are
        // zero-padded rather than panicking
        let parent_len = self.parent_hash.len().min(HASH_LEN);
        preimage[4..4 + parent_len].copy_from_slice(&self.parent_hash[..parent_len]);

        let root_len = self.trx_trie_root.len().min(HASH_LEN);
        preimage[36..36 + root_len].copy_from_slice(&self.trx_trie_root[..root_len]);

        preimage[68..72].copy_from_slice(&self.timestamp.to_be_bytes());
        preimage[72..80].copy_from_slice(&self.difficulty.to_be_bytes());
        preimage[80..84].copy_from_slice(&nonce.to_be_bytes());
        preimage
    }

    /// Header hash: SHA256(SHA256(mining preimage)) at the stored nonce.
    pub fn hash(&self) -> Vec<u8> {
        double_sha256_digest(&self.mining_preimage(self.nonce))
    }

    /// Whether the stored nonce satisfies the header's own difficulty.
    pub fn meets_own_target(&self) -> bool {
        let target = target_hex(compact_bits(self.difficulty));
        meets_target(self.hash().as_slice(), &target)
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_parent_hash(&self) -> &[u8] {
        self.parent_hash.as_slice()
    }

    pub fn get_coinbase(&self) -> &[u8] {
        self.coinbase.as_slice()
    }

    pub fn get_timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn get_difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u32 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    pub fn get_total_difficulty(&self) -> u128 {
        self.total_difficulty
    }

    pub fn set_total_difficulty(&mut self, total_difficulty: u128) {
        self.total_difficulty = total_difficulty;
    }

    pub fn get_state_root(&self) -> &[u8] {
        self.state_root.as_slice()
    }

    pub fn set_state_root(&mut self, state_root: Vec<u8>) {
        self.state_root = state_root;
    }

    pub fn get_trx_trie_root(&self) -> &[u8] {
        self.trx_trie_root.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    gas_limit: Vec<u8>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>, gas_limit: Vec<u8>) -> Block {
        Block {
            header,
            transactions,
            gas_limit,
        }
    }

    pub fn get_header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_gas_limit(&self) -> &[u8] {
        self.gas_limit.as_slice()
    }

    pub fn hash(&self) -> Vec<u8> {
        self.header.hash()
    }

    pub fn get_height(&self) -> u64 {
        self.header.get_height()
    }

    /// Invariant: the committed trx trie root equals the digest of the
    /// contained transactions.
    pub fn verify_trx_trie_root(&self) -> bool {
        merkle::transactions_root(&self.transactions) == self.header.get_trx_trie_root()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }
}

impl From<Block> for IVec {
    fn from(b: Block) -> Self {
        let bytes =
            serialize(&b).expect("Block serialization should never fail for IVec conversion");
        Self::from(bytes)
    }
}

/// Per-height chain bookkeeping. A height holds several records while forks
/// are live; exactly one carries `is_main` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockInfo {
    hash: Vec<u8>,
    is_main: bool,
    total_difficulty: u128,
}

impl BlockInfo {
    pub fn new(hash: Vec<u8>, is_main: bool, total_difficulty: u128) -> BlockInfo {
        BlockInfo {
            hash,
            is_main,
            total_difficulty,
        }
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub fn set_main(&mut self, is_main: bool) {
        self.is_main = is_main;
    }

    pub fn get_total_difficulty(&self) -> u128 {
        self.total_difficulty
    }
}
