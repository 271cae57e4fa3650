// Chain import and fork choice. The engine owns the repository handle and
// the best-block cursor; every mutation funnels through import_block on the
// manager thread. Fork choice is by cumulative difficulty with ties kept by
// the incumbent, and the per-height BlockInfo records carry the is_main
// marks that get rewired when a heavier branch takes over.

use crate::core::merkle::transactions_root;
use crate::core::state::{Executor, TransferExecutor, WorldState};
use crate::core::target::{calculate_next_difficulty, GENESIS_DIFFICULTY_BITS};
use crate::core::{AccountState, Block, BlockHeader, BlockInfo, Transaction, HASH_LEN};
use crate::error::{NodeError, Result};
use crate::storage::Repository;
use crate::utils::current_timestamp_secs;
use data_encoding::HEXLOWER;
use log::{info, warn};
use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Fixed genesis timestamp so every node mints an identical genesis block
/// for a given genesis address.
const GENESIS_TIMESTAMP: u32 = 1_700_000_000;

/// Balance allocated to the genesis address.
const GENESIS_ALLOC: u64 = 1_000_000_000_000;

/// Default per-block gas limit, stored as big-endian bytes in the block.
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Outcome of an import attempt. These are expected results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    /// Accepted and now the tip of the main chain
    BestBlock,
    /// Accepted onto a side branch (or lost a tie)
    NonBestBlock,
    /// Already known
    Exist,
    /// Failed validation
    Invalid,
}

#[derive(Debug, Clone)]
struct BestCursor {
    hash: Vec<u8>,
    height: u64,
    total_difficulty: u128,
}

#[derive(Clone)]
pub struct ChainEngine {
    repo: Repository,
    world: WorldState,
    executor: Arc<dyn Executor + Send + Sync>,
    best: Arc<RwLock<BestCursor>>,
    /// Single-writer discipline: imports from concurrent connection threads
    /// are serialized here; reads stay lock-free on the repository.
    import_lock: Arc<Mutex<()>>,
}

impl ChainEngine {
    /// Create a chain with a freshly minted genesis block, or open the
    /// existing one if the repository is already populated.
    pub fn create_chain(repo: Repository, genesis_address: &[u8]) -> Result<ChainEngine> {
        if repo.best_block_hash()?.is_some() {
            return Self::open(repo);
        }

        // Premine the genesis allocation so the chain starts with spendable
        // balance, then commit the resulting state root into the header
        let world = WorldState::new(repo.clone());
        repo.put_account_state(
            genesis_address,
            &AccountState::with_balance(&BigUint::from(GENESIS_ALLOC)),
        )?;
        let state_root = world.state_root()?;

        info!(
            "Creating genesis block for address {}",
            HEXLOWER.encode(genesis_address)
        );
        let genesis = Self::mint_genesis(genesis_address.to_vec(), state_root)?;
        let hash = genesis.hash();
        let total = genesis.get_header().get_total_difficulty();

        repo.put_block(&genesis)?;
        repo.put_block_infos(0, &[BlockInfo::new(hash.clone(), true, total)])?;
        repo.set_best_block_hash(&hash)?;

        Ok(ChainEngine {
            repo,
            world,
            executor: Arc::new(TransferExecutor),
            best: Arc::new(RwLock::new(BestCursor {
                hash,
                height: 0,
                total_difficulty: total,
            })),
            import_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Open an existing chain; fails when no genesis has been created yet.
    pub fn open(repo: Repository) -> Result<ChainEngine> {
        let best_hash = repo.best_block_hash()?.ok_or_else(|| {
            NodeError::Database("No existing chain found. Create one first.".to_string())
        })?;
        let best = repo
            .block(&best_hash)?
            .ok_or_else(|| NodeError::Database("Best block hash points nowhere".to_string()))?;

        let world = WorldState::new(repo.clone());
        Ok(ChainEngine {
            repo,
            world,
            executor: Arc::new(TransferExecutor),
            best: Arc::new(RwLock::new(BestCursor {
                hash: best_hash,
                height: best.get_height(),
                total_difficulty: best.get_header().get_total_difficulty(),
            })),
            import_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Swap in a different transaction executor (the VM seam).
    pub fn with_executor(mut self, executor: Arc<dyn Executor + Send + Sync>) -> ChainEngine {
        self.executor = executor;
        self
    }

    fn mint_genesis(coinbase: Vec<u8>, state_root: Vec<u8>) -> Result<Block> {
        let mut header = BlockHeader::new(
            0,
            vec![0u8; HASH_LEN],
            coinbase,
            GENESIS_TIMESTAMP,
            GENESIS_DIFFICULTY_BITS as u64,
            state_root,
            transactions_root(&[]),
        )?;
        header.set_total_difficulty(GENESIS_DIFFICULTY_BITS as u128);

        // Deterministic nonce search; the genesis target is easy enough
        // that this terminates in a few hundred hashes
        let mut nonce: u32 = 0;
        loop {
            header.set_nonce(nonce);
            if header.meets_own_target() {
                break;
            }
            nonce = nonce.checked_add(1).ok_or_else(|| {
                NodeError::Mining("Genesis nonce search exhausted".to_string())
            })?;
        }

        Ok(Block::new(
            header,
            vec![],
            DEFAULT_BLOCK_GAS_LIMIT.to_be_bytes().to_vec(),
        ))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn world_state(&self) -> &WorldState {
        &self.world
    }

    pub fn get_best_block(&self) -> Result<Block> {
        let cursor = self.cursor();
        self.repo
            .block(&cursor.hash)?
            .ok_or_else(|| NodeError::Database("Best block missing from repository".to_string()))
    }

    pub fn best_hash(&self) -> Vec<u8> {
        self.cursor().hash
    }

    pub fn best_height(&self) -> u64 {
        self.cursor().height
    }

    pub fn best_total_difficulty(&self) -> u128 {
        self.cursor().total_difficulty
    }

    pub fn genesis_hash(&self) -> Result<Vec<u8>> {
        let info = self
            .repo
            .main_block_info(0)?
            .ok_or_else(|| NodeError::Database("No genesis block info".to_string()))?;
        Ok(info.get_hash().to_vec())
    }

    pub fn has_block(&self, hash: &[u8]) -> bool {
        self.repo.has_block(hash).unwrap_or(false)
    }

    fn cursor(&self) -> BestCursor {
        self.best
            .read()
            .expect("Failed to acquire read lock on best cursor - this should never happen")
            .clone()
    }

    /// Import a block. Never errors for expected outcomes; the enum carries
    /// the verdict.
    pub fn import_block(&self, block: &Block) -> Result<ImportResult> {
        let _guard = self
            .import_lock
            .lock()
            .expect("Failed to acquire import lock - this should never happen");

        let hash = block.hash();
        if self.repo.has_block(&hash)? {
            return Ok(ImportResult::Exist);
        }

        // Genesis travels only through create_chain
        if block.get_height() == 0 {
            return Ok(ImportResult::Invalid);
        }

        let parent = match self.repo.block(block.get_header().get_parent_hash())? {
            Some(parent) => parent,
            None => {
                warn!(
                    "Rejecting block {} at height {}: unknown parent",
                    HEXLOWER.encode(&hash),
                    block.get_height()
                );
                return Ok(ImportResult::Invalid);
            }
        };

        if let Err(e) = self.validate_block(block, &parent) {
            warn!("Rejecting block {}: {e}", HEXLOWER.encode(&hash));
            return Ok(ImportResult::Invalid);
        }

        // Cumulative difficulty is recomputed locally, never trusted from
        // the wire. It does not enter the mining preimage, so rewriting it
        // leaves the hash intact.
        let total =
            parent.get_header().get_total_difficulty() + block.get_header().get_difficulty() as u128;
        let mut stored = block.clone();
        stored.header_mut().set_total_difficulty(total);

        self.repo.put_block(&stored)?;
        let mut infos = self.repo.block_infos(stored.get_height())?;
        infos.push(BlockInfo::new(hash.clone(), false, total));
        self.repo.put_block_infos(stored.get_height(), &infos)?;

        let best = self.cursor();
        // Strict comparison: an equal-difficulty challenger loses to the
        // incumbent
        if total > best.total_difficulty {
            self.rewire_main_chain(&stored, &best)?;

            let mut cursor = self
                .best
                .write()
                .expect("Failed to acquire write lock on best cursor - this should never happen");
            cursor.hash = hash.clone();
            cursor.height = stored.get_height();
            cursor.total_difficulty = total;
            drop(cursor);
            self.repo.set_best_block_hash(&hash)?;

            info!(
                "New best block {} at height {} (total difficulty {total})",
                HEXLOWER.encode(&hash),
                stored.get_height()
            );
            Ok(ImportResult::BestBlock)
        } else {
            info!(
                "Stored non-best block {} at height {} (total difficulty {total})",
                HEXLOWER.encode(&hash),
                stored.get_height()
            );
            Ok(ImportResult::NonBestBlock)
        }
    }

    fn validate_block(&self, block: &Block, parent: &Block) -> Result<()> {
        if block.get_height() != parent.get_height() + 1 {
            return Err(NodeError::Consensus(format!(
                "Height {} does not follow parent height {}",
                block.get_height(),
                parent.get_height()
            )));
        }

        if !block.get_header().meets_own_target() {
            return Err(NodeError::Consensus(
                "Header hash does not satisfy its difficulty target".to_string(),
            ));
        }

        if !block.verify_trx_trie_root() {
            return Err(NodeError::Consensus(
                "Transaction trie root does not match block transactions".to_string(),
            ));
        }

        self.validate_transactions(block.get_transactions())
    }

    /// Signature check plus per-sender nonce monotonicity: nonces must be
    /// strictly increasing within the block. Exact nonce matching against
    /// account state happens at execution time, where the branch's own
    /// history applies; a state-based floor here would reject valid
    /// side-branch blocks built before the current best.
    fn validate_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let mut last_nonce: HashMap<Vec<u8>, BigUint> = HashMap::new();

        for (i, tx) in transactions.iter().enumerate() {
            if !tx.verify() {
                return Err(NodeError::Consensus(format!(
                    "Invalid signature on transaction at index {i}"
                )));
            }

            let sender = tx.get_sender().to_vec();
            let nonce = tx.get_nonce();
            if let Some(previous) = last_nonce.get(&sender) {
                if nonce <= *previous {
                    return Err(NodeError::Consensus(format!(
                        "Non-increasing nonce for sender at transaction index {i}"
                    )));
                }
            }
            last_nonce.insert(sender, nonce);
        }
        Ok(())
    }

    /// Flip is_main marks from the old branch to the branch ending in
    /// `new_tip`, then replay the new branch's transactions. The walk-back
    /// stops at the first ancestor that is already on the main chain.
    fn rewire_main_chain(&self, new_tip: &Block, old_best: &BestCursor) -> Result<()> {
        // Collect the new branch, tip first, down to (not including) the
        // common ancestor
        let mut new_branch: Vec<Block> = Vec::new();
        let mut cursor = new_tip.clone();
        loop {
            new_branch.push(cursor.clone());
            if cursor.get_height() == 0 {
                break;
            }

            let parent_hash = cursor.get_header().get_parent_hash().to_vec();
            let parent = self.repo.block(&parent_hash)?.ok_or_else(|| {
                NodeError::Database("Branch walk hit a missing parent".to_string())
            })?;

            let parent_is_main = self
                .repo
                .main_block_info(parent.get_height())?
                .map(|info| info.get_hash() == parent.hash().as_slice())
                .unwrap_or(false);
            if parent_is_main {
                break;
            }
            cursor = parent;
        }

        let ancestor_height = new_branch
            .last()
            .map(|b| b.get_height().saturating_sub(1))
            .unwrap_or(0);

        // Old branch loses its marks above the ancestor
        for height in (ancestor_height + 1)..=old_best.height {
            let mut infos = self.repo.block_infos(height)?;
            let mut changed = false;
            for info in infos.iter_mut() {
                if info.is_main() {
                    info.set_main(false);
                    changed = true;
                }
            }
            if changed {
                self.repo.put_block_infos(height, &infos)?;
            }
        }

        // New branch gains them, oldest first
        for block in new_branch.iter().rev() {
            let hash = block.hash();
            let mut infos = self.repo.block_infos(block.get_height())?;
            for info in infos.iter_mut() {
                info.set_main(info.get_hash() == hash.as_slice());
            }
            self.repo.put_block_infos(block.get_height(), &infos)?;
        }

        // Replay state transitions along the new branch, oldest first
        for block in new_branch.iter().rev() {
            self.apply_block_transactions(block);
        }
        Ok(())
    }

    /// Run each transaction through the executor. A halted transaction rolls
    /// back alone; the rest of the block still applies.
    fn apply_block_transactions(&self, block: &Block) {
        for tx in block.get_transactions() {
            let mut tracked = self.world.start_tracking();
            let outcome = self.executor.execute(tx, &mut tracked);
            if outcome.is_success() {
                if let Err(e) = tracked.commit() {
                    warn!("Failed to commit transaction state: {e}");
                }
            } else {
                warn!(
                    "Transaction {} halted with {outcome:?}, rolled back",
                    HEXLOWER.encode(&tx.id())
                );
                tracked.rollback();
            }
        }
    }

    /// Difficulty for a block at `time` following `parent`.
    pub fn calculate_block_difficulty(&self, parent: &Block, time: u32) -> u64 {
        calculate_next_difficulty(
            parent.get_header().get_difficulty(),
            parent.get_header().get_timestamp(),
            time,
        )
    }

    /// Compose an unmined candidate on top of `parent`. The parent is an
    /// explicit snapshot so a concurrent best-block change cannot shift the
    /// candidate under the miner. The nonce stays zero and the total
    /// difficulty stays unset until the miner fills them in.
    pub fn generate_new_block(
        &self,
        parent: &Block,
        coinbase: Vec<u8>,
        pending: &[Transaction],
    ) -> Result<Block> {
        let time = current_timestamp_secs()?;
        let difficulty = self.calculate_block_difficulty(parent, time);

        // Provisional post-execution root: run the pending set against a
        // tracked view, take the root, throw the view away
        let mut tracked = self.world.start_tracking();
        for tx in pending {
            let _ = self.executor.execute(tx, &mut tracked);
        }
        let state_root = tracked.provisional_root()?;
        tracked.rollback();

        let header = BlockHeader::new(
            parent.get_height() + 1,
            parent.hash(),
            coinbase,
            time,
            difficulty,
            state_root,
            transactions_root(pending),
        )?;

        Ok(Block::new(
            header,
            pending.to_vec(),
            DEFAULT_BLOCK_GAS_LIMIT.to_be_bytes().to_vec(),
        ))
    }

    /// Main-chain blocks for heights `[from, from + count]`, stopping at
    /// the first height with no main-chain entry (heights are contiguous
    /// from genesis, so the first miss marks the end of the chain).
    pub fn main_chain_blocks(&self, from: u64, count: u64) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for height in from..=from.saturating_add(count) {
            match self.repo.main_block(height)? {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        Ok(blocks)
    }

    /// Main-chain headers for heights `[from, from + count]`.
    pub fn main_chain_headers(&self, from: u64, count: u64) -> Result<Vec<BlockHeader>> {
        Ok(self
            .main_chain_blocks(from, count)?
            .into_iter()
            .map(|block| block.get_header().clone())
            .collect())
    }
}
