//! Key management, address derivation, wallet collection

pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_bytes, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
