use clap::Parser;
use data_encoding::HEXLOWER;
use emberchain::core::{ChainEngine, WorldState};
use emberchain::network::{send_message, Manager, Message, Server, CENTRAL_NODE};
use emberchain::storage::{Keystore, Repository};
use emberchain::wallet::{address_to_bytes, validate_address, Wallets};
use emberchain::{Command, NodeError, Opt, Transaction, GLOBAL_CONFIG};
use log::{error, LevelFilter};
use num_bigint::BigUint;
use std::process;

const DEFAULT_GAS_PRICE: u64 = 1;
const DEFAULT_GAS_LIMIT: u64 = 100_000;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn open_repository() -> Result<Repository, Box<dyn std::error::Error>> {
    let node_id = GLOBAL_CONFIG
        .node_id()
        .unwrap_or_else(|| GLOBAL_CONFIG.node_id_from_addr());
    let db_path = Repository::node_db_path(&node_id)?;
    Ok(Repository::open(&db_path)?)
}

fn open_wallets(repo: Repository) -> Result<Wallets, Box<dyn std::error::Error>> {
    let keystore = Keystore::open(repo, &GLOBAL_CONFIG.keystore_password())?;
    Ok(Wallets::load(keystore)?)
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let repo = open_repository()?;
            let chain = ChainEngine::create_chain(repo, &address_to_bytes(&address)?)?;
            println!(
                "Done! Genesis hash: {}",
                HEXLOWER.encode(&chain.genesis_hash()?)
            );
        }
        Command::Createaccount => {
            let repo = open_repository()?;
            let mut wallets = open_wallets(repo)?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::ListAccounts => {
            let repo = open_repository()?;
            let wallets = open_wallets(repo)?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let repo = open_repository()?;
            let account = WorldState::new(repo).account(&address_to_bytes(&address)?);
            println!("Balance of '{address}': {}", account.get_balance());
            println!("Nonce: {}", account.get_nonce());
        }
        Command::Send { from, to, amount } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid receiver address: {to}").into());
            }

            let repo = open_repository()?;
            let wallets = open_wallets(repo.clone())?;
            let wallet = wallets.require_wallet(&from)?;

            let sender = address_to_bytes(&from)?;
            let nonce = WorldState::new(repo).account(&sender).get_nonce();
            let mut tx = Transaction::new(
                sender,
                address_to_bytes(&to)?,
                &BigUint::from(amount),
                &nonce,
                DEFAULT_GAS_PRICE,
                DEFAULT_GAS_LIMIT,
                vec![],
                wallet.get_public_key().to_vec(),
            )?;
            tx.sign(wallet.get_pkcs8())?;

            let txid = tx.id();
            send_message(
                CENTRAL_NODE,
                &Message::NewTransactions {
                    addr_from: GLOBAL_CONFIG.node_addr(),
                    transactions: vec![tx],
                },
            )?;
            println!("Sent transaction {}", HEXLOWER.encode(&txid));
        }
        Command::Printchain => {
            let repo = open_repository()?;
            let chain = ChainEngine::open(repo)?;

            for height in 0..=chain.best_height() {
                let block = chain
                    .repository()
                    .main_block(height)?
                    .ok_or_else(|| NodeError::Database(format!("No main block at {height}")))?;
                println!(
                    "Height {height}: {} (parent {}, {} tx, total difficulty {})",
                    HEXLOWER.encode(&block.hash()),
                    HEXLOWER.encode(block.get_header().get_parent_hash()),
                    block.get_transactions().len(),
                    block.get_header().get_total_difficulty(),
                );
            }
        }
        Command::Startnode { mine } => {
            let repo = open_repository()?;
            let chain = ChainEngine::open(repo)?;
            let manager = Manager::new(chain);

            if let Some(mining_address) = mine {
                if !validate_address(&mining_address) {
                    return Err(format!("Invalid mining address: {mining_address}").into());
                }
                GLOBAL_CONFIG.set_mining_addr(mining_address.clone());
                manager.set_coinbase(address_to_bytes(&mining_address)?);
                println!("Mining into {mining_address}");
            }

            let addr = GLOBAL_CONFIG.node_addr();
            Server::new(manager).run(&addr)?;
        }
    }
    Ok(())
}
