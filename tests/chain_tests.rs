//! Chain engine integration tests
//!
//! Covers the import verdicts, fork choice by cumulative difficulty, the
//! per-height is_main bookkeeping, and state transitions on the winning
//! branch.

use emberchain::core::{
    merkle::transactions_root, state::BASE_TX_GAS, Block, BlockHeader, ChainEngine, ImportResult,
    Miner, Transaction, ADDRESS_LEN,
};
use emberchain::network::Manager;
use emberchain::storage::Repository;
use emberchain::wallet::Wallet;
use num_bigint::BigUint;
use tempfile::tempdir;

/// Moderately easy compact target, a handful of hash attempts per block.
const EASY_BITS: u64 = 0x20100000;

/// Saturating compact target (every hash hits) with a larger stored
/// difficulty value, so two of these outweigh three EASY_BITS blocks.
const HEAVY_BITS: u64 = 0x31000001;

fn test_chain(genesis: &[u8]) -> (tempfile::TempDir, ChainEngine) {
    let dir = tempdir().unwrap();
    let repo = Repository::open(dir.path().to_str().unwrap()).unwrap();
    let chain = ChainEngine::create_chain(repo, genesis).unwrap();
    (dir, chain)
}

/// Mine a child block on `parent` with chosen difficulty and transactions.
fn mine_child(
    parent: &Block,
    difficulty: u64,
    timestamp: u32,
    transactions: Vec<Transaction>,
) -> Block {
    let header = BlockHeader::new(
        parent.get_height() + 1,
        parent.hash(),
        vec![0x0c; ADDRESS_LEN],
        timestamp,
        difficulty,
        parent.get_header().get_state_root().to_vec(),
        transactions_root(&transactions),
    )
    .unwrap();
    let candidate = Block::new(header, transactions, parent.get_gas_limit().to_vec());

    let result = Miner::new().mine(candidate, 0).unwrap();
    assert!(result.success, "test block failed to mine");
    result.block
}

fn signed_transfer(wallet: &Wallet, receiver: &[u8], amount: u64, nonce: u64) -> Transaction {
    let mut tx = Transaction::new(
        wallet.address_bytes(),
        receiver.to_vec(),
        &BigUint::from(amount),
        &BigUint::from(nonce),
        1,
        100_000,
        vec![],
        wallet.get_public_key().to_vec(),
    )
    .unwrap();
    tx.sign(wallet.get_pkcs8()).unwrap();
    tx
}

#[test]
fn test_import_verdicts() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();

    let block = mine_child(&genesis, EASY_BITS, 2_000, vec![]);
    assert_eq!(chain.import_block(&block).unwrap(), ImportResult::BestBlock);
    assert_eq!(chain.import_block(&block).unwrap(), ImportResult::Exist);

    // A block whose parent is unknown is invalid
    let orphan_parent = mine_child(&genesis, EASY_BITS, 3_000, vec![]);
    let orphan = mine_child(&orphan_parent, EASY_BITS, 3_001, vec![]);
    assert_eq!(chain.import_block(&orphan).unwrap(), ImportResult::Invalid);
}

#[test]
fn test_import_rejects_failed_pow() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();

    // Hard target, nonce never searched: the header cannot satisfy it
    let header = BlockHeader::new(
        1,
        genesis.hash(),
        vec![0x0c; ADDRESS_LEN],
        2_000,
        0x1d00ffff,
        genesis.get_header().get_state_root().to_vec(),
        transactions_root(&[]),
    )
    .unwrap();
    let unmined = Block::new(header, vec![], genesis.get_gas_limit().to_vec());

    assert_eq!(chain.import_block(&unmined).unwrap(), ImportResult::Invalid);
}

#[test]
fn test_import_rejects_mismatched_trx_root() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();
    let wallet = Wallet::new().unwrap();

    // Root commits to an empty list but the body carries a transaction
    let header = BlockHeader::new(
        1,
        genesis.hash(),
        vec![0x0c; ADDRESS_LEN],
        2_000,
        HEAVY_BITS,
        genesis.get_header().get_state_root().to_vec(),
        transactions_root(&[]),
    )
    .unwrap();
    let candidate = Block::new(
        header,
        vec![signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 5, 0)],
        genesis.get_gas_limit().to_vec(),
    );
    let mined = Miner::new().mine(candidate, 0).unwrap().block;

    assert_eq!(chain.import_block(&mined).unwrap(), ImportResult::Invalid);
}

#[test]
fn test_total_difficulty_is_additive_and_pow_holds() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();

    let b1 = mine_child(&genesis, EASY_BITS, 2_000, vec![]);
    let b2 = mine_child(&b1, EASY_BITS, 2_010, vec![]);
    chain.import_block(&b1).unwrap();
    chain.import_block(&b2).unwrap();

    let stored_b1 = chain.repository().block(&b1.hash()).unwrap().unwrap();
    let stored_b2 = chain.repository().block(&b2.hash()).unwrap().unwrap();

    assert_eq!(
        stored_b1.get_header().get_total_difficulty(),
        genesis.get_header().get_total_difficulty() + EASY_BITS as u128
    );
    assert_eq!(
        stored_b2.get_header().get_total_difficulty(),
        stored_b1.get_header().get_total_difficulty() + EASY_BITS as u128
    );

    // Every imported header satisfies its own embedded target
    for block in [&stored_b1, &stored_b2] {
        assert!(block.get_header().meets_own_target());
    }
}

#[test]
fn test_fork_switch_by_cumulative_difficulty() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();

    // Branch A: three light blocks
    let a1 = mine_child(&genesis, EASY_BITS, 2_000, vec![]);
    let a2 = mine_child(&a1, EASY_BITS, 2_010, vec![]);
    let a3 = mine_child(&a2, EASY_BITS, 2_020, vec![]);
    assert_eq!(chain.import_block(&a1).unwrap(), ImportResult::BestBlock);
    assert_eq!(chain.import_block(&a2).unwrap(), ImportResult::BestBlock);
    assert_eq!(chain.import_block(&a3).unwrap(), ImportResult::BestBlock);

    // Branch B: two heavy blocks sharing the genesis
    let b1 = mine_child(&genesis, HEAVY_BITS, 2_500, vec![]);
    let b2 = mine_child(&b1, HEAVY_BITS, 2_510, vec![]);
    assert!(
        2 * HEAVY_BITS as u128 > 3 * EASY_BITS as u128,
        "branch B must outweigh branch A"
    );

    // First B block lands on a side branch, the second flips the chain
    assert_eq!(chain.import_block(&b1).unwrap(), ImportResult::NonBestBlock);
    assert_eq!(chain.import_block(&b2).unwrap(), ImportResult::BestBlock);

    assert_eq!(chain.best_hash(), b2.hash());
    assert_eq!(chain.best_height(), 2);

    // is_main flipped on both branches
    let repo = chain.repository();
    let h1_infos = repo.block_infos(1).unwrap();
    assert!(h1_infos
        .iter()
        .any(|i| i.get_hash() == b1.hash().as_slice() && i.is_main()));
    assert!(h1_infos
        .iter()
        .any(|i| i.get_hash() == a1.hash().as_slice() && !i.is_main()));

    let h2_main = repo.main_block_info(2).unwrap().unwrap();
    assert_eq!(h2_main.get_hash(), b2.hash().as_slice());

    // The old tip height has no main block any more
    assert!(repo.main_block_info(3).unwrap().is_none());

    // Exactly one main entry per populated height up to the new best
    for height in 1..=2 {
        let main_count = repo
            .block_infos(height)
            .unwrap()
            .iter()
            .filter(|i| i.is_main())
            .count();
        assert_eq!(main_count, 1, "height {height} must have one main block");
    }
}

#[test]
fn test_equal_total_difficulty_keeps_incumbent() {
    let (_dir, chain) = test_chain(&[1u8; ADDRESS_LEN]);
    let genesis = chain.get_best_block().unwrap();

    let first = mine_child(&genesis, HEAVY_BITS, 2_000, vec![]);
    let challenger = mine_child(&genesis, HEAVY_BITS, 2_001, vec![]);
    assert_ne!(first.hash(), challenger.hash());

    assert_eq!(chain.import_block(&first).unwrap(), ImportResult::BestBlock);
    assert_eq!(
        chain.import_block(&challenger).unwrap(),
        ImportResult::NonBestBlock
    );

    assert_eq!(chain.best_hash(), first.hash());
    let main = chain.repository().main_block_info(1).unwrap().unwrap();
    assert_eq!(main.get_hash(), first.hash().as_slice());
}

#[test]
fn test_best_block_transfer_moves_balances() {
    let wallet = Wallet::new().unwrap();
    let (_dir, chain) = test_chain(&wallet.address_bytes());
    let genesis = chain.get_best_block().unwrap();
    let receiver = [9u8; ADDRESS_LEN];

    let tx = signed_transfer(&wallet, &receiver, 12_345, 0);
    let block = mine_child(&genesis, HEAVY_BITS, 2_000, vec![tx]);
    assert_eq!(chain.import_block(&block).unwrap(), ImportResult::BestBlock);

    let world = chain.world_state();
    assert_eq!(
        world.account(&receiver).get_balance(),
        BigUint::from(12_345u64)
    );
    let sender = world.account(&wallet.address_bytes());
    assert_eq!(sender.get_nonce(), BigUint::from(1u32));
    // Genesis allocation minus amount and gas
    assert_eq!(
        sender.get_balance(),
        BigUint::from(1_000_000_000_000u64 - 12_345 - BASE_TX_GAS)
    );
}

#[test]
fn test_pool_purged_by_best_block_only() {
    let wallet = Wallet::new().unwrap();
    let (_dir, chain) = test_chain(&wallet.address_bytes());
    let genesis = chain.get_best_block().unwrap();
    let manager = Manager::new(chain);

    // t1 and t3 go into the best block (consecutive nonces, both apply);
    // t2 rides the losing fork and t4 stays unconfirmed
    let t1 = signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 10, 0);
    let t3 = signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 30, 1);
    let t2 = signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 20, 2);
    let t4 = signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 40, 3);
    for tx in [&t1, &t2, &t3, &t4] {
        manager.pool().admit(tx.clone());
    }

    // A losing-fork block containing t2 must not purge it
    let side = mine_child(&genesis, EASY_BITS, 2_000, vec![t2.clone()]);
    let best = mine_child(&genesis, HEAVY_BITS, 2_001, vec![t1.clone(), t3.clone()]);

    assert_eq!(
        manager.handle_new_block(None, &best).unwrap(),
        ImportResult::BestBlock
    );
    assert_eq!(
        manager.handle_new_block(None, &side).unwrap(),
        ImportResult::NonBestBlock
    );

    let remaining: Vec<Vec<u8>> = manager.pool().snapshot().iter().map(|tx| tx.id()).collect();
    assert_eq!(remaining, vec![t2.id(), t4.id()]);
}

#[test]
fn test_generate_new_block_composes_candidate() {
    let wallet = Wallet::new().unwrap();
    let (_dir, chain) = test_chain(&wallet.address_bytes());
    let genesis = chain.get_best_block().unwrap();

    let pending = vec![signed_transfer(&wallet, &[9u8; ADDRESS_LEN], 5, 0)];
    let candidate = chain
        .generate_new_block(&genesis, vec![0x0c; ADDRESS_LEN], &pending)
        .unwrap();

    assert_eq!(candidate.get_height(), 1);
    assert_eq!(candidate.get_header().get_parent_hash(), genesis.hash());
    assert_eq!(candidate.get_header().get_nonce(), 0);
    assert_eq!(candidate.get_header().get_total_difficulty(), 0);
    assert_eq!(
        candidate.get_header().get_trx_trie_root(),
        transactions_root(&pending)
    );
    assert!(candidate.verify_trx_trie_root());
}

#[test]
fn test_chain_reopen_restores_best_cursor() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_string();

    let best_hash = {
        let repo = Repository::open(&path).unwrap();
        let chain = ChainEngine::create_chain(repo, &[1u8; ADDRESS_LEN]).unwrap();
        let genesis = chain.get_best_block().unwrap();
        let block = mine_child(&genesis, EASY_BITS, 2_000, vec![]);
        chain.import_block(&block).unwrap();
        chain.best_hash()
    };

    let repo = Repository::open(&path).unwrap();
    let reopened = ChainEngine::open(repo).unwrap();
    assert_eq!(reopened.best_hash(), best_hash);
    assert_eq!(reopened.best_height(), 1);
}
