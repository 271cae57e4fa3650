//! Lifecycle orchestration
//!
//! The manager owns the chain engine, the peer roster, the pending pool,
//! the miner handle, and the sync state machine. Guarantees held here: at
//! most one mining worker runs; starting mining while a sync is active is a
//! no-op; a new best block at or above the miner's in-flight height cancels
//! the attempt; broadcast of a best block excludes the peer it came from;
//! only a best block's own transactions purge the pending pool.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, ChainEngine, ImportResult, Miner};
use crate::error::Result;
use crate::network::message::{Message, Status};
use crate::network::peer::Peers;
use crate::network::server::send_message;
use crate::network::sync::SyncManager;
use crate::storage::PendingPool;
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

pub const PROTOCOL_VERSION: u32 = 1;

const MAX_PEERS: usize = 8;

/// Idle spin while the mining worker waits out a sync or an error.
const MINER_BACKOFF: Duration = Duration::from_millis(200);

pub struct Manager {
    chain: ChainEngine,
    peers: Peers,
    pool: PendingPool,
    miner: Miner,
    sync: Mutex<SyncManager>,
    mining_enabled: AtomicBool,
    coinbase: RwLock<Option<Vec<u8>>>,
    node_id: String,
}

impl Manager {
    pub fn new(chain: ChainEngine) -> Arc<Manager> {
        Arc::new(Manager {
            chain,
            peers: Peers::new(MAX_PEERS),
            pool: PendingPool::new(),
            miner: Miner::new(),
            sync: Mutex::new(SyncManager::new()),
            mining_enabled: AtomicBool::new(false),
            coinbase: RwLock::new(None),
            node_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    pub fn chain(&self) -> &ChainEngine {
        &self.chain
    }

    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    pub fn pool(&self) -> &PendingPool {
        &self.pool
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn set_coinbase(&self, coinbase: Vec<u8>) {
        let mut guard = self
            .coinbase
            .write()
            .expect("Failed to acquire write lock on coinbase - this should never happen");
        *guard = Some(coinbase);
    }

    fn coinbase(&self) -> Option<Vec<u8>> {
        self.coinbase
            .read()
            .expect("Failed to acquire read lock on coinbase - this should never happen")
            .clone()
    }

    pub fn is_miner(&self) -> bool {
        self.coinbase().is_some()
    }

    /// Run a closure against the sync state machine.
    pub fn with_sync<T>(&self, f: impl FnOnce(&mut SyncManager) -> T) -> T {
        let mut sync = self
            .sync
            .lock()
            .expect("Failed to acquire sync lock - this should never happen");
        f(&mut sync)
    }

    pub fn sync_active(&self) -> bool {
        self.with_sync(|sync| sync.is_syncing())
    }

    /// Our STATUS for handshakes and best-block announcements.
    pub fn local_status(&self) -> Result<Status> {
        Ok(Status {
            node_id: self.node_id.clone(),
            addr_from: GLOBAL_CONFIG.node_addr(),
            protocol_version: PROTOCOL_VERSION,
            network_id: GLOBAL_CONFIG.network_id(),
            total_difficulty: self.chain.best_total_difficulty(),
            best_hash: self.chain.best_hash(),
            best_height: self.chain.best_height(),
            genesis_hash: self.chain.genesis_hash()?,
        })
    }

    /// Spawn the mining worker. No-op without a coinbase, while a sync is
    /// active, or when the worker is already running.
    pub fn start_mining(self: &Arc<Self>) {
        if self.coinbase().is_none() {
            return;
        }
        if self.sync_active() {
            info!("Not starting miner while sync is in progress");
            return;
        }
        if self.mining_enabled.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        thread::spawn(move || manager.mining_loop());
        info!("Mining worker started");
    }

    /// Stop the worker and cancel any in-flight search.
    pub fn stop_mining(&self) {
        self.mining_enabled.store(false, Ordering::SeqCst);
        self.miner.stop();
    }

    /// Cancel the in-flight attempt; the worker idles while the sync runs
    /// and resumes on fresh state afterwards.
    pub fn pause_for_sync(&self) {
        self.miner.skip();
    }

    fn mining_loop(&self) {
        while self.mining_enabled.load(Ordering::SeqCst) {
            if self.sync_active() {
                thread::sleep(MINER_BACKOFF);
                continue;
            }

            let coinbase = match self.coinbase() {
                Some(coinbase) => coinbase,
                None => break,
            };

            // Snapshot of pool and parent taken before each attempt; the
            // candidate never changes under the search
            let pending = self.pool.snapshot();
            let parent = match self.chain.get_best_block() {
                Ok(parent) => parent,
                Err(e) => {
                    error!("Failed to read best block: {e}");
                    thread::sleep(MINER_BACKOFF);
                    continue;
                }
            };
            let parent_total_difficulty = parent.get_header().get_total_difficulty();
            let candidate = match self.chain.generate_new_block(&parent, coinbase, &pending) {
                Ok(candidate) => candidate,
                Err(e) => {
                    error!("Failed to compose candidate block: {e}");
                    thread::sleep(MINER_BACKOFF);
                    continue;
                }
            };

            let result = match self.miner.mine(candidate, parent_total_difficulty) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Mining attempt not started: {e}");
                    thread::sleep(MINER_BACKOFF);
                    continue;
                }
            };

            if !self.mining_enabled.load(Ordering::SeqCst) {
                break;
            }

            if result.success {
                match self.handle_new_block(None, &result.block) {
                    Ok(ImportResult::BestBlock) => {
                        info!(
                            "Mined block {} at height {}",
                            HEXLOWER.encode(&result.block.hash()),
                            result.block.get_height()
                        );
                    }
                    Ok(other) => {
                        warn!("Mined block did not become best: {other:?}");
                    }
                    Err(e) => {
                        error!("Failed to import mined block: {e}");
                    }
                }
            }
            // Cancelled or exhausted searches fall through: the next pass
            // rebuilds the candidate with a fresh timestamp and pool snapshot
        }
        info!("Mining worker stopped");
    }

    /// Import without broadcasting. On a new best block, cancels a miner
    /// working at or below the new height and purges exactly the included
    /// transactions.
    pub fn import_block_quiet(&self, block: &Block) -> Result<ImportResult> {
        let result = self.chain.import_block(block)?;
        if result == ImportResult::BestBlock {
            if self.miner.is_working() && self.miner.in_flight_height() <= block.get_height() {
                info!(
                    "Cancelling miner at height {} for imported block at height {}",
                    self.miner.in_flight_height(),
                    block.get_height()
                );
                self.miner.skip();
            }
            self.pool.purge_included(block);
        }
        Ok(result)
    }

    /// Import and, when the block becomes best, announce it to every peer
    /// except the one it came from.
    pub fn handle_new_block(&self, origin: Option<&str>, block: &Block) -> Result<ImportResult> {
        let result = self.import_block_quiet(block)?;
        if result == ImportResult::BestBlock {
            self.broadcast_block(origin, block);
        }
        Ok(result)
    }

    fn broadcast_block(&self, origin: Option<&str>, block: &Block) {
        let addr_from = GLOBAL_CONFIG.node_addr();
        let targets = match origin {
            Some(origin) => self.peers.addrs_except(origin),
            None => self.peers.addrs(),
        };

        for addr in targets {
            let message = Message::NewBlock {
                addr_from: addr_from.clone(),
                block: block.clone(),
            };
            if let Err(e) = send_message(&addr, &message) {
                warn!("Failed to announce block to {addr}: {e}");
                self.peers.remove(&addr);
            }
        }
    }
}
