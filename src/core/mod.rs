//! Consensus core: data model, chain engine, miner, world-state

pub mod block;
pub mod chain;
pub mod merkle;
pub mod miner;
pub mod state;
pub mod target;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockInfo, BLOCK_VERSION, HASH_LEN, MINING_PREIMAGE_LEN};
pub use chain::{ChainEngine, ImportResult, DEFAULT_BLOCK_GAS_LIMIT};
pub use merkle::{transactions_root, MerkleTree, EMPTY_TRX_ROOT};
pub use miner::{MineResult, Miner};
pub use state::{
    contract_address, AccountState, ExecutionOutcome, Executor, TrackedState, TransferExecutor,
    WorldState, EMPTY_CODE_HASH, EMPTY_STATE_ROOT,
};
pub use target::{
    calculate_next_difficulty, compact_bits, meets_target, target_from_compact, target_hex,
    target_to_compact, GENESIS_DIFFICULTY_BITS, TARGET_SPACING_SECS,
};
pub use transaction::{Transaction, ADDRESS_LEN};
