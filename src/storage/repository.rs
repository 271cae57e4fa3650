// Persistent key-value spaces behind the chain engine. One sled database per
// node, one tree per record family:
//
//   blocks       block hash        -> Block
//   block_infos  height (u64 BE)   -> Vec<BlockInfo>, several during forks
//   accounts     address (20B)     -> AccountState
//   code         code hash (32B)   -> contract code bytes
//   keys         index (u32 BE)    -> encrypted key blob
//
// Writes happen on the manager thread only; reads are safe from the miner
// worker as well (sled trees are thread-safe).

use crate::core::{AccountState, Block, BlockInfo};
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use sled::{Db, Tree};
use std::env::current_dir;
use std::path::PathBuf;

const BLOCKS_TREE: &str = "blocks";
const BLOCK_INFOS_TREE: &str = "block_infos";
const ACCOUNTS_TREE: &str = "accounts";
const CODE_TREE: &str = "code";
const KEYS_TREE: &str = "keys";

/// Key inside the blocks tree that tracks the best block hash.
const BEST_BLOCK_HASH_KEY: &str = "best_block_hash";

#[derive(Clone)]
pub struct Repository {
    db: Db,
    db_path: PathBuf,
}

impl Repository {
    pub fn open(db_path: &str) -> Result<Repository> {
        let path = PathBuf::from(db_path);
        let db = sled::open(&path)
            .map_err(|e| NodeError::Database(format!("Failed to open database: {e}")))?;
        Ok(Repository { db, db_path: path })
    }

    /// Default database path (./data/)
    pub fn default_db_path() -> Result<String> {
        Ok(current_dir()?.join("data").to_string_lossy().to_string())
    }

    /// Node-specific database path (./data/node_2001/) so multiple nodes can
    /// run on one machine with isolated databases
    pub fn node_db_path(node_id: &str) -> Result<String> {
        Ok(current_dir()?
            .join("data")
            .join(format!("node_{node_id}"))
            .to_string_lossy()
            .to_string())
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn tree(&self, name: &str) -> Result<Tree> {
        self.db
            .open_tree(name)
            .map_err(|e| NodeError::Database(format!("Failed to open tree {name}: {e}")))
    }

    pub fn put_block(&self, block: &Block) -> Result<()> {
        let tree = self.tree(BLOCKS_TREE)?;
        tree.insert(block.hash(), block.serialize()?.as_slice())
            .map_err(|e| NodeError::Database(format!("Failed to store block: {e}")))?;
        Ok(())
    }

    pub fn block(&self, hash: &[u8]) -> Result<Option<Block>> {
        let tree = self.tree(BLOCKS_TREE)?;
        let bytes = tree
            .get(hash)
            .map_err(|e| NodeError::Database(format!("Failed to get block: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &[u8]) -> Result<bool> {
        let tree = self.tree(BLOCKS_TREE)?;
        let exists = tree
            .contains_key(hash)
            .map_err(|e| NodeError::Database(format!("Failed to check block existence: {e}")))?;
        Ok(exists)
    }

    pub fn set_best_block_hash(&self, hash: &[u8]) -> Result<()> {
        let tree = self.tree(BLOCKS_TREE)?;
        tree.insert(BEST_BLOCK_HASH_KEY, hash)
            .map_err(|e| NodeError::Database(format!("Failed to set best block hash: {e}")))?;
        Ok(())
    }

    pub fn best_block_hash(&self) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(BLOCKS_TREE)?;
        let bytes = tree
            .get(BEST_BLOCK_HASH_KEY)
            .map_err(|e| NodeError::Database(format!("Failed to get best block hash: {e}")))?;
        Ok(bytes.map(|b| b.to_vec()))
    }

    pub fn block_infos(&self, height: u64) -> Result<Vec<BlockInfo>> {
        let tree = self.tree(BLOCK_INFOS_TREE)?;
        let bytes = tree
            .get(height.to_be_bytes())
            .map_err(|e| NodeError::Database(format!("Failed to get block infos: {e}")))?;
        match bytes {
            Some(bytes) => deserialize::<Vec<BlockInfo>>(bytes.as_ref()),
            None => Ok(vec![]),
        }
    }

    pub fn put_block_infos(&self, height: u64, infos: &[BlockInfo]) -> Result<()> {
        let tree = self.tree(BLOCK_INFOS_TREE)?;
        tree.insert(height.to_be_bytes(), serialize(&infos.to_vec())?.as_slice())
            .map_err(|e| NodeError::Database(format!("Failed to store block infos: {e}")))?;
        Ok(())
    }

    /// The main-chain record at a height, if the height is populated.
    pub fn main_block_info(&self, height: u64) -> Result<Option<BlockInfo>> {
        Ok(self
            .block_infos(height)?
            .into_iter()
            .find(|info| info.is_main()))
    }

    /// Main-chain block at a height.
    pub fn main_block(&self, height: u64) -> Result<Option<Block>> {
        match self.main_block_info(height)? {
            Some(info) => self.block(info.get_hash()),
            None => Ok(None),
        }
    }

    pub fn account_state(&self, address: &[u8]) -> Result<Option<AccountState>> {
        let tree = self.tree(ACCOUNTS_TREE)?;
        let bytes = tree
            .get(address)
            .map_err(|e| NodeError::Database(format!("Failed to get account state: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(deserialize::<AccountState>(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn put_account_state(&self, address: &[u8], state: &AccountState) -> Result<()> {
        let tree = self.tree(ACCOUNTS_TREE)?;
        tree.insert(address, serialize(state)?.as_slice())
            .map_err(|e| NodeError::Database(format!("Failed to store account state: {e}")))?;
        Ok(())
    }

    /// Every account, in address byte order (sled iterates key-sorted).
    pub fn accounts(&self) -> Result<Vec<(Vec<u8>, AccountState)>> {
        let tree = self.tree(ACCOUNTS_TREE)?;
        let mut accounts = Vec::new();
        for entry in tree.iter() {
            let (key, value) =
                entry.map_err(|e| NodeError::Database(format!("Failed to scan accounts: {e}")))?;
            accounts.push((key.to_vec(), deserialize::<AccountState>(value.as_ref())?));
        }
        Ok(accounts)
    }

    pub fn code(&self, code_hash: &[u8]) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(CODE_TREE)?;
        let bytes = tree
            .get(code_hash)
            .map_err(|e| NodeError::Database(format!("Failed to get code: {e}")))?;
        Ok(bytes.map(|b| b.to_vec()))
    }

    pub fn put_code(&self, code_hash: &[u8], code: &[u8]) -> Result<()> {
        let tree = self.tree(CODE_TREE)?;
        tree.insert(code_hash, code)
            .map_err(|e| NodeError::Database(format!("Failed to store code: {e}")))?;
        Ok(())
    }

    pub fn put_key_blob(&self, index: u32, blob: &[u8]) -> Result<()> {
        let tree = self.tree(KEYS_TREE)?;
        tree.insert(index.to_be_bytes(), blob)
            .map_err(|e| NodeError::Database(format!("Failed to store key blob: {e}")))?;
        Ok(())
    }

    pub fn key_blob(&self, index: u32) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(KEYS_TREE)?;
        let bytes = tree
            .get(index.to_be_bytes())
            .map_err(|e| NodeError::Database(format!("Failed to get key blob: {e}")))?;
        Ok(bytes.map(|b| b.to_vec()))
    }

    pub fn key_blob_count(&self) -> Result<u32> {
        let tree = self.tree(KEYS_TREE)?;
        Ok(tree.len() as u32)
    }
}
