//! World-state and the transaction executor contract
//!
//! The chain engine never mutates accounts directly. It asks the world state
//! for a tracked view, hands the view plus a transaction to an executor, and
//! then either commits the view (state root moves forward) or rolls it back
//! (no mutation). VM halts are data, not panics: the engine only branches on
//! the outcome tag and the resulting state root.

use crate::core::Transaction;
use crate::error::Result;
use crate::storage::Repository;
use crate::utils::{serialize, sha256_digest};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel root of an account with no storage.
pub static EMPTY_STATE_ROOT: Lazy<Vec<u8>> = Lazy::new(|| sha256_digest(&[]));

/// Sentinel code hash of a non-contract account.
pub static EMPTY_CODE_HASH: Lazy<Vec<u8>> = Lazy::new(|| sha256_digest(&[]));

/// Base gas charged for any transaction.
pub const BASE_TX_GAS: u64 = 21_000;

/// Gas charged per byte of call data.
pub const TX_DATA_GAS: u64 = 68;

/// Gas charged per byte of deployed contract code.
pub const CREATE_DATA_GAS: u64 = 200;

/// Upper bound on deployed contract code size, in bytes.
pub const MAX_CONTRACT_SIZE: usize = 24_576;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AccountState {
    nonce: Vec<u8>,   // big-endian unsigned integer
    balance: Vec<u8>, // big-endian unsigned integer
    state_root: Vec<u8>,
    code_hash: Vec<u8>,
}

impl Default for AccountState {
    fn default() -> Self {
        AccountState {
            nonce: vec![],
            balance: vec![],
            state_root: EMPTY_STATE_ROOT.clone(),
            code_hash: EMPTY_CODE_HASH.clone(),
        }
    }
}

impl AccountState {
    pub fn with_balance(balance: &BigUint) -> AccountState {
        AccountState {
            balance: balance.to_bytes_be(),
            ..Default::default()
        }
    }

    pub fn get_nonce(&self) -> BigUint {
        BigUint::from_bytes_be(&self.nonce)
    }

    pub fn set_nonce(&mut self, nonce: &BigUint) {
        self.nonce = nonce.to_bytes_be();
    }

    pub fn increment_nonce(&mut self) {
        let next = self.get_nonce() + BigUint::from(1u32);
        self.nonce = next.to_bytes_be();
    }

    pub fn get_balance(&self) -> BigUint {
        BigUint::from_bytes_be(&self.balance)
    }

    pub fn set_balance(&mut self, balance: &BigUint) {
        self.balance = balance.to_bytes_be();
    }

    pub fn get_state_root(&self) -> &[u8] {
        self.state_root.as_slice()
    }

    pub fn get_code_hash(&self) -> &[u8] {
        self.code_hash.as_slice()
    }

    pub fn set_code_hash(&mut self, code_hash: Vec<u8>) {
        self.code_hash = code_hash;
    }

    /// A contract is an account whose code hash is not the empty sentinel.
    pub fn is_contract(&self) -> bool {
        self.code_hash != *EMPTY_CODE_HASH
    }
}

/// Address of a contract created by `sender` at `nonce`: the key-hash style
/// digest of (sender || nonce), truncated to 20 bytes.
pub fn contract_address(sender: &[u8], nonce: &BigUint) -> Vec<u8> {
    let mut preimage = sender.to_vec();
    preimage.extend_from_slice(&nonce.to_bytes_be());
    sha256_digest(&preimage)[..crate::core::ADDRESS_LEN].to_vec()
}

/// Account states backed by the repository.
#[derive(Clone)]
pub struct WorldState {
    repo: Repository,
}

impl WorldState {
    pub fn new(repo: Repository) -> WorldState {
        WorldState { repo }
    }

    pub fn account(&self, address: &[u8]) -> AccountState {
        self.repo
            .account_state(address)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Open a tracked view. Changes stay in the view until `commit`.
    pub fn start_tracking(&self) -> TrackedState<'_> {
        TrackedState {
            world: self,
            touched: HashMap::new(),
            code: HashMap::new(),
        }
    }

    /// Digest over every account, addresses in byte order. Recomputed rather
    /// than incrementally maintained; account counts here stay small.
    pub fn state_root(&self) -> Result<Vec<u8>> {
        self.root_with_overlay(&HashMap::new())
    }

    fn root_with_overlay(&self, overlay: &HashMap<Vec<u8>, AccountState>) -> Result<Vec<u8>> {
        let mut accounts: HashMap<Vec<u8>, AccountState> =
            self.repo.accounts()?.into_iter().collect();
        for (address, state) in overlay {
            accounts.insert(address.clone(), state.clone());
        }

        let mut sorted: Vec<(Vec<u8>, AccountState)> = accounts.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut preimage = Vec::new();
        for (address, state) in &sorted {
            preimage.extend_from_slice(address);
            preimage.extend_from_slice(serialize(state)?.as_slice());
        }
        Ok(sha256_digest(&preimage))
    }
}

/// Mutable overlay over the world state. Dropped views roll back.
pub struct TrackedState<'a> {
    world: &'a WorldState,
    touched: HashMap<Vec<u8>, AccountState>,
    code: HashMap<Vec<u8>, Vec<u8>>,
}

impl TrackedState<'_> {
    pub fn account(&self, address: &[u8]) -> AccountState {
        if let Some(state) = self.touched.get(address) {
            return state.clone();
        }
        self.world.account(address)
    }

    pub fn put_account(&mut self, address: Vec<u8>, state: AccountState) {
        self.touched.insert(address, state);
    }

    /// Stage contract code; returns its hash.
    pub fn put_code(&mut self, code: Vec<u8>) -> Vec<u8> {
        let code_hash = sha256_digest(&code);
        self.code.insert(code_hash.clone(), code);
        code_hash
    }

    /// State root as it would be after committing this view.
    pub fn provisional_root(&self) -> Result<Vec<u8>> {
        self.world.root_with_overlay(&self.touched)
    }

    /// Fold the view into the repository and return the new state root.
    pub fn commit(self) -> Result<Vec<u8>> {
        for (code_hash, code) in &self.code {
            self.world.repo.put_code(code_hash, code)?;
        }
        for (address, state) in &self.touched {
            self.world.repo.put_account_state(address, state)?;
        }
        self.world.state_root()
    }

    /// Discard the view. No repository mutation.
    pub fn rollback(self) {}
}

/// Halt states of the collaborating virtual machine. `Return` is the only
/// success tag; everything else leaves the pre-transaction state in place.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Return(Vec<u8>),
    Revert,
    OutOfGas,
    BadJump,
    StackUnderflow,
    StackOverflow,
    IllegalOp,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Return(_))
    }
}

/// The executor seam the chain engine calls through. The stack VM plugs in
/// here; the engine only observes the outcome tag and the state root.
pub trait Executor {
    fn execute(&self, tx: &Transaction, state: &mut TrackedState<'_>) -> ExecutionOutcome;
}

/// Baseline executor: plain balance transfers, nonce bookkeeping, gas-limit
/// charging, and contract code deployment without bytecode interpretation.
pub struct TransferExecutor;

impl Executor for TransferExecutor {
    fn execute(&self, tx: &Transaction, state: &mut TrackedState<'_>) -> ExecutionOutcome {
        let gas_needed = if tx.is_contract_creation() {
            if tx.get_data().len() > MAX_CONTRACT_SIZE {
                return ExecutionOutcome::OutOfGas;
            }
            BASE_TX_GAS + CREATE_DATA_GAS * tx.get_data().len() as u64
        } else {
            BASE_TX_GAS + TX_DATA_GAS * tx.get_data().len() as u64
        };

        if tx.get_gas_limit() < gas_needed {
            return ExecutionOutcome::OutOfGas;
        }

        let mut sender = state.account(tx.get_sender());
        if sender.get_nonce() != tx.get_nonce() {
            return ExecutionOutcome::Revert;
        }

        let amount = tx.get_amount();
        let gas_cost = BigUint::from(tx.get_gas_price()) * BigUint::from(gas_needed);
        let total_cost = &amount + &gas_cost;
        if sender.get_balance() < total_cost {
            return ExecutionOutcome::Revert;
        }

        sender.set_balance(&(sender.get_balance() - &total_cost));
        sender.increment_nonce();

        if tx.is_contract_creation() {
            let created = contract_address(tx.get_sender(), &tx.get_nonce());
            let code_hash = state.put_code(tx.get_data().to_vec());

            let mut contract = state.account(&created);
            contract.set_balance(&(contract.get_balance() + &amount));
            contract.set_code_hash(code_hash);

            state.put_account(tx.get_sender().to_vec(), sender);
            state.put_account(created.clone(), contract);
            return ExecutionOutcome::Return(created);
        }

        // Self-transfers must not read a stale receiver copy of the account
        if tx.get_receiver() == tx.get_sender() {
            sender.set_balance(&(sender.get_balance() + &amount));
            state.put_account(tx.get_sender().to_vec(), sender);
            return ExecutionOutcome::Return(vec![]);
        }

        let mut receiver = state.account(tx.get_receiver());
        receiver.set_balance(&(receiver.get_balance() + &amount));

        state.put_account(tx.get_sender().to_vec(), sender);
        state.put_account(tx.get_receiver().to_vec(), receiver);
        ExecutionOutcome::Return(vec![])
    }
}
