use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "emberchain", about = "Proof-of-work account-model blockchain node")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new chain; the genesis allocation goes to ADDRESS
    Createchain {
        /// Address funded by the genesis block
        address: String,
    },
    /// Create a new account in the encrypted keystore
    Createaccount,
    /// List the addresses in the keystore
    ListAccounts,
    /// Show the balance and nonce of an address
    GetBalance {
        /// Address to query
        address: String,
    },
    /// Sign a transfer and hand it to the network
    Send {
        /// Sender address (must be in the keystore)
        from: String,
        /// Receiver address
        to: String,
        /// Amount to transfer
        amount: u64,
    },
    /// Print the main chain from genesis to the best block
    Printchain,
    /// Run the node
    Startnode {
        /// Mine into this address
        #[arg(long)]
        mine: Option<String>,
    },
}
