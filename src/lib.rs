//! # Emberchain
//!
//! A proof-of-work blockchain node with account-based state, patterned
//! after the early Ethereum design. What lives here:
//!
//! - **Consensus core**: double-SHA256 header proof-of-work against a
//!   compact-encoded target, fork choice by cumulative difficulty, and a
//!   per-height `BlockInfo` ledger that tracks the main chain through forks
//! - **Account model**: balances, nonces, and contract code hashes behind a
//!   tracked world-state view that commits or rolls back per transaction
//! - **Mining**: a cancellable nonce search on its own worker thread
//! - **Sync**: header-first catch-up with a 200-block common-ancestor walk
//! - **P2P**: length-prefixed frames over TCP, a coded message set, and a
//!   per-message fault-isolated dispatcher
//!
//! ## Layout
//! - `core/`: blocks, transactions, difficulty targets, chain engine, miner,
//!   world state
//! - `network/`: messages, peer roster, sync state machine, dispatcher,
//!   manager, TCP server
//! - `storage/`: sled-backed repository, pending pool, encrypted keystore
//! - `wallet/`: ECDSA P-256 keys and key-hash addresses
//! - `config/`: environment-fed settings
//! - `cli/`: the node binary's commands
//!
//! Decisions worth remembering: the canonical byte encoding is the bincode
//! standard layout and its generation is committed in the header version;
//! difficulty is stored as 64 bits whose low half is the compact target
//! encoding; target comparison happens on 64-digit lowercase hex strings.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, BlockHeader, BlockInfo, ChainEngine, ImportResult, MineResult, Miner, Transaction,
    WorldState,
};
pub use error::{NodeError, Result};
pub use network::{Manager, Message, Peers, Server, Status, SyncManager, SyncState, CENTRAL_NODE};
pub use storage::{Keystore, PendingPool, Repository};
pub use wallet::{
    address_to_bytes, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
};
